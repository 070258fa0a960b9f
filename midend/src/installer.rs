// installer.rs — Snippet and substitution installation
//
// Builds template graphs for snippet methods and substitute methods and
// publishes them in the compiler's storage, keyed by the method a later
// compilation will look up. Installation is locate → build → post-process →
// inline callees → publish; post-processing runs through a Customizer whose
// hooks a client can replace wholesale.
//
// The installer is a single-session object: it tracks the substitution in
// flight (substitute, original, and whether the substitute called back into
// the original) and clears that state on every exit path. Substitution
// installation must run on the thread that created the installer.
//
// Preconditions: referenced classes/methods resolved in the registry.
// Postconditions: storage maps the original method to its template graph.
// Failure modes: malformed declarations → ConfigurationError; duplicate
//                publishes and graph-machinery violations →
//                GraphInternalError.

use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

use crate::builder::{build, BuilderConfig};
use crate::canonicalize::canonicalize;
use crate::dce::eliminate_dead_nodes;
use crate::error::{ConfigurationError, Error, GraphInternalError};
use crate::graph::Graph;
use crate::inline::{inline, AlwaysInlinePolicy, DefaultInliningPolicy, InlineConfig, InliningPolicy};
use crate::intrinsify::intrinsify;
use crate::node::Node;
use crate::phase::PhaseContext;
use crate::registry::{ClassId, MethodId, MethodRegistry};
use crate::verify::verify;

// ── Published graphs ────────────────────────────────────────────────────────

/// An immutable published template graph with install provenance.
#[derive(Debug)]
pub struct InstalledGraph {
    /// The method a compilation looks up (the original, for substitutions).
    pub method: MethodId,
    pub name: String,
    pub graph: Graph,
    /// The substitute called back into the method it replaces.
    pub calls_original: bool,
    /// SHA-256 over the method name and the graph rendering.
    pub fingerprint: [u8; 32],
}

impl InstalledGraph {
    pub fn new(
        registry: &MethodRegistry,
        method: MethodId,
        graph: Graph,
        calls_original: bool,
    ) -> Self {
        let name = registry.qualified_name(method);
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update(b"\n");
        hasher.update(graph.to_string().as_bytes());
        let fingerprint = hasher.finalize().into();
        InstalledGraph {
            method,
            name,
            graph,
            calls_original,
            fingerprint,
        }
    }
}

/// Side table of published template graphs and macro associations, owned by
/// whoever owns the compilation session. Publishing is first-writer-wins
/// with a hard failure on the second writer.
#[derive(Debug, Default)]
pub struct CompilerStorage {
    graphs: Mutex<FxHashMap<MethodId, Arc<InstalledGraph>>>,
    macros: Mutex<FxHashMap<MethodId, String>>,
}

impl CompilerStorage {
    pub fn new() -> Self {
        CompilerStorage::default()
    }

    pub fn publish_graph(&self, installed: InstalledGraph) -> Result<(), GraphInternalError> {
        let mut graphs = self
            .graphs
            .lock()
            .map_err(|_| GraphInternalError::ShouldNotReachHere("storage mutex poisoned".into()))?;
        match graphs.entry(installed.method) {
            Entry::Occupied(_) => Err(GraphInternalError::DuplicateInstallation {
                method: installed.name,
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(installed));
                Ok(())
            }
        }
    }

    pub fn graph_for(&self, method: MethodId) -> Option<Arc<InstalledGraph>> {
        self.graphs.lock().ok()?.get(&method).cloned()
    }

    pub fn publish_macro(
        &self,
        method: MethodId,
        name: String,
        node: String,
    ) -> Result<(), GraphInternalError> {
        let mut macros = self
            .macros
            .lock()
            .map_err(|_| GraphInternalError::ShouldNotReachHere("storage mutex poisoned".into()))?;
        match macros.entry(method) {
            Entry::Occupied(_) => Err(GraphInternalError::DuplicateInstallation { method: name }),
            Entry::Vacant(slot) => {
                slot.insert(node);
                Ok(())
            }
        }
    }

    pub fn macro_for(&self, method: MethodId) -> Option<String> {
        self.macros.lock().ok()?.get(&method).cloned()
    }
}

// ── Customizer ──────────────────────────────────────────────────────────────

/// Shape of the graph being finalized, as seen by `before_final`.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeShape {
    pub is_substitution: bool,
    pub calls_original: bool,
}

/// Post-processing hooks of the installation pipeline. Replace the whole
/// object to change any of them.
pub trait Customizer: Send {
    /// Builder configuration for every graph this installation produces.
    fn build_config(&self) -> BuilderConfig {
        BuilderConfig::snippet_default()
    }

    fn after_build(&self, graph: &mut Graph, cx: &PhaseContext) -> Result<(), Error>;
    fn after_inline(&self, graph: &mut Graph, cx: &PhaseContext) -> Result<(), Error>;
    fn after_all_inlines(&self, graph: &mut Graph, cx: &PhaseContext) -> Result<(), Error>;
    fn before_final(
        &self,
        graph: &mut Graph,
        cx: &PhaseContext,
        shape: &FinalizeShape,
    ) -> Result<(), Error>;
}

/// Standard post-processing: verify fresh graphs, fold aggressively after
/// every splice, and strip bookkeeping from substitutions that stand alone.
#[derive(Debug, Default)]
pub struct DefaultCustomizer;

impl Customizer for DefaultCustomizer {
    fn after_build(&self, graph: &mut Graph, cx: &PhaseContext) -> Result<(), Error> {
        verify(graph)?;
        intrinsify(graph, cx.registry, false)?;
        canonicalize(graph, cx.registry.types())?;
        Ok(())
    }

    fn after_inline(&self, graph: &mut Graph, cx: &PhaseContext) -> Result<(), Error> {
        intrinsify(graph, cx.registry, false)?;
        canonicalize(graph, cx.registry.types())?;
        Ok(())
    }

    fn after_all_inlines(&self, graph: &mut Graph, cx: &PhaseContext) -> Result<(), Error> {
        intrinsify(graph, cx.registry, false)?;
        eliminate_dead_nodes(graph)?;
        canonicalize(graph, cx.registry.types())?;
        Ok(())
    }

    fn before_final(
        &self,
        graph: &mut Graph,
        cx: &PhaseContext,
        shape: &FinalizeShape,
    ) -> Result<(), Error> {
        // Last chance for markers that insisted on constant arguments.
        intrinsify(graph, cx.registry, true)?;
        if shape.is_substitution && !shape.calls_original {
            strip_frame_states(graph)?;
            eliminate_dead_nodes(graph)?;
        }
        insert_state_placeholders(graph)?;
        Ok(())
    }
}

/// Detach frame states from every call site. A standalone substitution's
/// states describe the substitute method, which no longer exists once the
/// template replaces the original.
pub fn strip_frame_states(graph: &mut Graph) -> Result<(), GraphInternalError> {
    for invoke in graph.invokes() {
        if !graph.is_live(invoke) {
            continue;
        }
        let Some(state) = graph[invoke].invoke_state() else {
            continue;
        };
        let target = graph[invoke].inputs[0];
        let stamp = graph[invoke].stamp().clone();
        let bare = graph.add(Node::invoke(target, stamp))?;
        graph.replace_and_delete(invoke, bare)?;
        if graph.is_live(state) && graph.uses(state).is_empty() {
            graph.delete(state)?;
        }
    }
    Ok(())
}

/// Mark every stateless call site with a placeholder that the consuming
/// compilation replaces by a real post-call state.
pub fn insert_state_placeholders(graph: &mut Graph) -> Result<(), GraphInternalError> {
    for invoke in graph.invokes() {
        if !graph.is_live(invoke) || graph[invoke].invoke_state().is_some() {
            continue;
        }
        let already = graph
            .uses(invoke)
            .iter()
            .any(|&u| matches!(graph[u].kind, crate::node::NodeKind::StateAfterPlaceholder));
        if !already {
            graph.add(Node::state_after_placeholder(invoke))?;
        }
    }
    Ok(())
}

// ── Installer ───────────────────────────────────────────────────────────────

/// One installation session. Builds template graphs for marked methods of
/// the classes it is pointed at and publishes them into storage.
pub struct SnippetInstaller<'a> {
    registry: &'a MethodRegistry,
    storage: &'a CompilerStorage,
    customizer: Box<dyn Customizer>,
    policies: FxHashMap<String, Box<dyn InliningPolicy>>,
    inline_config: InlineConfig,
    graph_cache: FxHashMap<MethodId, Graph>,
    owner: ThreadId,
    // In-flight substitution state, cleared on every exit path.
    substitute: Option<MethodId>,
    original: Option<MethodId>,
    substitute_calls_original: bool,
}

impl<'a> SnippetInstaller<'a> {
    pub fn new(registry: &'a MethodRegistry, storage: &'a CompilerStorage) -> Self {
        let mut policies: FxHashMap<String, Box<dyn InliningPolicy>> = FxHashMap::default();
        policies.insert(
            "default".to_string(),
            Box::new(DefaultInliningPolicy::default()),
        );
        policies.insert("always".to_string(), Box::new(AlwaysInlinePolicy));
        SnippetInstaller {
            registry,
            storage,
            customizer: Box::new(DefaultCustomizer),
            policies,
            inline_config: InlineConfig::default(),
            graph_cache: FxHashMap::default(),
            owner: thread::current().id(),
            substitute: None,
            original: None,
            substitute_calls_original: false,
        }
    }

    pub fn with_customizer(mut self, customizer: Box<dyn Customizer>) -> Self {
        self.customizer = customizer;
        self
    }

    /// Register an inlining policy under a name snippet markers can refer
    /// to. A later registration under the same name replaces the earlier.
    pub fn register_policy(&mut self, name: impl Into<String>, policy: Box<dyn InliningPolicy>) {
        self.policies.insert(name.into(), policy);
    }

    /// Install every snippet method declared by `class`, each under its own
    /// identity.
    pub fn install_snippets(&mut self, class: ClassId) -> Result<(), Error> {
        let methods = self.registry.declared_methods(class).to_vec();
        for method in methods {
            let meta = self.registry.method(method);
            let Some(marker) = meta.snippet.clone() else {
                continue;
            };
            if meta.modifiers.is_abstract || meta.modifiers.is_native {
                return Err(ConfigurationError::AbstractOrNativeSnippet {
                    method: self.registry.qualified_name(method),
                }
                .into());
            }
            let policy = marker.inlining.as_deref().unwrap_or("default").to_string();
            let graph = self.make_graph(method, &policy)?;
            self.storage
                .publish_graph(InstalledGraph::new(self.registry, method, graph, false))?;
        }
        Ok(())
    }

    /// Install every substitution and macro substitution declared by
    /// `class` against its substitution target class.
    pub fn install_substitutions(&mut self, class: ClassId) -> Result<(), Error> {
        if thread::current().id() != self.owner {
            return Err(ConfigurationError::WrongInstallerThread.into());
        }
        let class_meta = self.registry.class(class);
        let class_name = class_meta.name.clone();
        let target_name = class_meta.substitution_of.clone().ok_or(
            ConfigurationError::MissingSubstitutionTarget { class: class_name },
        )?;
        let target_class = self.registry.lookup_class(&target_name).map_err(|source| {
            ConfigurationError::UnresolvedType {
                name: target_name.clone(),
                source,
            }
        })?;

        let methods = self.registry.declared_methods(class).to_vec();
        for method in methods {
            let meta = self.registry.method(method);
            if meta.substitution.is_none() && meta.macro_subst.is_none() {
                continue;
            }
            // Substitutes of either kind must be static.
            if !meta.modifiers.is_static {
                return Err(ConfigurationError::NonStaticSubstitution {
                    method: self.registry.qualified_name(method),
                }
                .into());
            }
            if let Some(marker) = meta.substitution.clone() {
                if meta.modifiers.is_abstract || meta.modifiers.is_native {
                    return Err(ConfigurationError::AbstractOrNativeSubstitution {
                        method: self.registry.qualified_name(method),
                    }
                    .into());
                }
                let original_name = marker.original.unwrap_or_else(|| meta.name.clone());
                let original = self.resolve_original(target_class, &target_name, &original_name)?;
                self.install_method_substitution(original, method)?;
            } else if let Some(marker) = meta.macro_subst.clone() {
                let original_name = marker.original.unwrap_or_else(|| meta.name.clone());
                let original = self.resolve_original(target_class, &target_name, &original_name)?;
                self.storage.publish_macro(
                    original,
                    self.registry.qualified_name(original),
                    marker.node,
                )?;
            }
        }
        Ok(())
    }

    fn resolve_original(
        &self,
        target_class: ClassId,
        target_name: &str,
        original_name: &str,
    ) -> Result<MethodId, ConfigurationError> {
        self.registry
            .lookup_method(target_class, original_name)
            .map_err(|source| ConfigurationError::UnresolvedOriginalMethod {
                class: target_name.to_string(),
                name: original_name.to_string(),
                source,
            })
    }

    /// Build the substitute's graph and publish it under the original
    /// method. The in-flight markers are cleared whether or not the build
    /// succeeds.
    pub fn install_method_substitution(
        &mut self,
        original: MethodId,
        substitute: MethodId,
    ) -> Result<(), Error> {
        self.substitute = Some(substitute);
        self.original = Some(original);
        self.substitute_calls_original = false;

        let built = self.make_graph(substitute, "default");
        let calls_original = self.substitute_calls_original;
        self.substitute = None;
        self.original = None;
        self.substitute_calls_original = false;

        let graph = built?;
        self.storage.publish_graph(InstalledGraph::new(
            self.registry,
            original,
            graph,
            calls_original,
        ))?;
        Ok(())
    }

    // ── Graph production ────────────────────────────────────────────────

    /// Build, post-process, and inline the template graph for `method`,
    /// splicing callees the named policy approves.
    pub fn make_graph(&mut self, method: MethodId, policy: &str) -> Result<Graph, Error> {
        if !self.policies.contains_key(policy) {
            return Err(GraphInternalError::UnknownInliningPolicy(policy.to_string()).into());
        }
        let mut graph = build(self.registry, method, &self.customizer.build_config())?;
        let cx = PhaseContext::with_storage(self.registry, self.storage);
        self.customizer.after_build(&mut graph, &cx)?;

        // Snapshot: splices add invokes from callee bodies; those belong to
        // already-processed graphs and are not revisited.
        let invokes = graph.invokes();
        for invoke in invokes {
            if !graph.is_live(invoke) {
                continue;
            }
            let Some(target) = graph[invoke].invoke_target() else {
                continue;
            };
            let Some((kind, callee)) = graph[target].target_method() else {
                continue;
            };
            if !kind.is_direct() {
                continue;
            }

            let spliced = if self.original == Some(callee) {
                // The substitute calls the method it replaces: splice in the
                // original's own graph and remember that it did.
                self.substitute_calls_original = true;
                let callee_graph = self.parse_graph(callee)?;
                inline(&mut graph, invoke, &callee_graph, &self.inline_config)?;
                true
            } else {
                let approved = self
                    .policies
                    .get(policy)
                    .map(|p| p.should_inline(self.registry, method, callee))
                    .unwrap_or(false);
                if approved && self.registry.method(callee).body.is_some() {
                    let callee_graph = self.parse_graph(callee)?;
                    inline(&mut graph, invoke, &callee_graph, &self.inline_config)?;
                    true
                } else {
                    false
                }
            };
            if spliced {
                self.customizer.after_inline(&mut graph, &cx)?;
            }
        }

        self.customizer.after_all_inlines(&mut graph, &cx)?;
        let shape = FinalizeShape {
            is_substitution: self.substitute == Some(method),
            calls_original: self.substitute_calls_original,
        };
        self.customizer.before_final(&mut graph, &cx, &shape)?;
        Ok(graph)
    }

    /// Build-and-canonicalize a callee graph, once per session.
    fn parse_graph(&mut self, method: MethodId) -> Result<Graph, Error> {
        if let Some(cached) = self.graph_cache.get(&method) {
            return Ok(cached.clone());
        }
        let mut graph = build(self.registry, method, &self.customizer.build_config())?;
        let cx = PhaseContext::with_storage(self.registry, self.storage);
        self.customizer.after_build(&mut graph, &cx)?;
        self.graph_cache.insert(method, graph.clone());
        Ok(graph)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
