// registry.rs — Method and type metadata registry
//
// The method-resolution collaborator: classes, declared methods, modifier
// queries, snippet/substitution/macro/intrinsic markers, and portable method
// bodies that the graph builder turns into IR. Descriptions load from JSON
// documents; `canonical_json` renders a compact, deterministic projection
// used as fingerprint input.
//
// Preconditions: none.
// Failure modes: malformed documents and duplicate declarations →
//                ConfigurationError; name lookups → LookupError.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, LookupError};
use crate::node::{BinOp, ConstValue, InvokeKind};
use crate::stamp::{ElemKind, Stamp};

// ── Identifiers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub u32);

// ── Type table ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeMeta {
    pub name: String,
    /// Component type for array types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// A final type has no subtypes, so its declared form is also exact.
    #[serde(default, rename = "final")]
    pub is_final: bool,
}

/// The stamp/type collaborator's view of declared types.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: FxHashMap<String, TypeMeta>,
}

impl TypeTable {
    pub fn insert(&mut self, ty: TypeMeta) {
        self.types.insert(ty.name.clone(), ty);
    }

    pub fn component_of(&self, name: &str) -> Option<&str> {
        self.types.get(name)?.component.as_deref()
    }

    pub fn is_final(&self, name: &str) -> bool {
        self.types.get(name).is_some_and(|t| t.is_final)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

// ── Method metadata ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default, rename = "native")]
    pub is_native: bool,
}

/// Marks a method as a snippet: its graph is installed under its own
/// identity for later template use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnippetMarker {
    /// Name of a registered inlining policy; the default policy when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inlining: Option<String>,
}

/// Marks a method as a substitution for a method of the class's
/// substitution target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubstitutionMarker {
    /// Name of the original method; the substitute's own name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
}

/// Marks a method as a macro substitution: the original method is associated
/// with a macro node kind instead of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroMarker {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    /// Name of the macro node kind to associate with the original method.
    pub node: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrinsicOp {
    ArrayLength,
    LoadIndexed { elem: ElemKind },
}

/// Marks a method as intrinsifiable: invokes of it are rewritten into a
/// dedicated node by the intrinsification phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicMarker {
    pub op: IntrinsicOp,
    /// Only intrinsify when every argument is a compile-time constant;
    /// honored by the constant-parameter-aware run before finalization.
    #[serde(default)]
    pub requires_const_args: bool,
}

/// One operation of a portable method body. Operands reference earlier ops
/// by position. Calls name their callee; resolution happens at graph-build
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Const { value: ConstValue },
    Param { index: u16 },
    Binary { bin: BinOp, lhs: usize, rhs: usize },
    LoadIndexed {
        array: usize,
        index: usize,
        length: usize,
        elem: ElemKind,
    },
    ArrayLength { array: usize },
    Pi {
        object: usize,
        class: String,
        #[serde(default)]
        exact: bool,
    },
    Call {
        kind: InvokeKind,
        class: String,
        name: String,
        #[serde(default)]
        args: Vec<usize>,
    },
    Instrument { tag: String, value: usize },
    Throw { value: usize },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<usize>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodBody {
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodMeta {
    pub name: String,
    #[serde(skip)]
    pub class: ClassId,
    #[serde(flatten)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub params: Vec<Stamp>,
    #[serde(default = "Stamp::void", rename = "return")]
    pub return_stamp: Stamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<SnippetMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitution: Option<SubstitutionMarker>,
    #[serde(default, rename = "macro", skip_serializing_if = "Option::is_none")]
    pub macro_subst: Option<MacroMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrinsic: Option<IntrinsicMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MethodBody>,
}

#[derive(Debug, Clone)]
pub struct ClassMeta {
    pub name: String,
    /// Class-level substitution target: the class whose methods the
    /// substitution methods declared here replace.
    pub substitution_of: Option<String>,
    pub methods: Vec<MethodId>,
}

// ── JSON document shape ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassDoc {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    substitution_of: Option<String>,
    #[serde(default)]
    methods: Vec<MethodMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryDoc {
    #[serde(default)]
    types: Vec<TypeMeta>,
    #[serde(default)]
    classes: Vec<ClassDoc>,
}

// ── Registry ────────────────────────────────────────────────────────────────

/// The registry of classes, methods, and declared types.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    types: TypeTable,
    classes: Vec<ClassMeta>,
    methods: Vec<MethodMeta>,
    class_index: FxHashMap<String, ClassId>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        MethodRegistry::default()
    }

    /// Merge a JSON registry document into this registry.
    pub fn load_json(&mut self, doc: &str) -> Result<(), ConfigurationError> {
        let doc: RegistryDoc = serde_json::from_str(doc)
            .map_err(|e| ConfigurationError::MalformedRegistry(e.to_string()))?;
        for ty in doc.types {
            self.add_type(ty);
        }
        for class in doc.classes {
            let id = self.add_class(&class.name, class.substitution_of.clone())?;
            for method in class.methods {
                self.add_method(id, method)?;
            }
        }
        Ok(())
    }

    pub fn add_type(&mut self, ty: TypeMeta) {
        self.types.insert(ty);
    }

    pub fn add_class(
        &mut self,
        name: &str,
        substitution_of: Option<String>,
    ) -> Result<ClassId, ConfigurationError> {
        if self.class_index.contains_key(name) {
            return Err(ConfigurationError::MalformedRegistry(format!(
                "class '{name}' declared twice"
            )));
        }
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(ClassMeta {
            name: name.to_string(),
            substitution_of,
            methods: Vec::new(),
        });
        self.class_index.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn add_method(
        &mut self,
        class: ClassId,
        mut meta: MethodMeta,
    ) -> Result<MethodId, ConfigurationError> {
        let class_meta = &self.classes[class.0 as usize];
        if class_meta
            .methods
            .iter()
            .any(|&m| self.methods[m.0 as usize].name == meta.name)
        {
            return Err(ConfigurationError::MalformedRegistry(format!(
                "method '{}.{}' declared twice",
                class_meta.name, meta.name
            )));
        }
        meta.class = class;
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(meta);
        self.classes[class.0 as usize].methods.push(id);
        Ok(id)
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    pub fn lookup_class(&self, name: &str) -> Result<ClassId, LookupError> {
        self.class_index
            .get(name)
            .copied()
            .ok_or_else(|| LookupError::UnknownClass(name.to_string()))
    }

    pub fn lookup_method(&self, class: ClassId, name: &str) -> Result<MethodId, LookupError> {
        let class_meta = &self.classes[class.0 as usize];
        class_meta
            .methods
            .iter()
            .copied()
            .find(|&m| self.methods[m.0 as usize].name == name)
            .ok_or_else(|| LookupError::UnknownMethod {
                class: class_meta.name.clone(),
                name: name.to_string(),
            })
    }

    /// Lookup by `class` and method name in one step.
    pub fn lookup_qualified(
        &self,
        class_name: &str,
        method_name: &str,
    ) -> Result<MethodId, LookupError> {
        let class = self.lookup_class(class_name)?;
        self.lookup_method(class, method_name)
    }

    pub fn class(&self, id: ClassId) -> &ClassMeta {
        &self.classes[id.0 as usize]
    }

    pub fn method(&self, id: MethodId) -> &MethodMeta {
        &self.methods[id.0 as usize]
    }

    pub fn declared_methods(&self, class: ClassId) -> &[MethodId] {
        &self.classes[class.0 as usize].methods
    }

    pub fn qualified_name(&self, id: MethodId) -> String {
        let meta = self.method(id);
        format!("{}.{}", self.classes[meta.class.0 as usize].name, meta.name)
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Compact deterministic JSON of the registry contents, used as
    /// fingerprint input. Types are sorted by name; classes and methods
    /// keep declaration order.
    pub fn canonical_json(&self) -> String {
        let mut types: Vec<&TypeMeta> = self.types.types.values().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        let classes: Vec<ClassDoc> = self
            .classes
            .iter()
            .map(|c| ClassDoc {
                name: c.name.clone(),
                substitution_of: c.substitution_of.clone(),
                methods: c
                    .methods
                    .iter()
                    .map(|&m| self.methods[m.0 as usize].clone())
                    .collect(),
            })
            .collect();
        serde_json::json!({ "types": types, "classes": classes }).to_string()
    }
}

impl fmt::Display for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "registry: {} classes, {} methods, {} types",
            self.classes.len(),
            self.methods.len(),
            self.types.types.len()
        )?;
        for class in &self.classes {
            writeln!(f, "  class {} ({} methods)", class.name, class.methods.len())?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
