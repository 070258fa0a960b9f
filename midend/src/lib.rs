//! midge — a typed dataflow graph IR with snippet-based lowering.
//!
//! The crate models one method's instructions as a graph of typed nodes
//! ([`node`], [`graph`], [`stamp`]), rewrites it to a fixed point
//! ([`canonicalize`], [`dce`]), and installs template graphs for snippet
//! and substitution methods ([`installer`]) that later compilations splice
//! into their own graphs ([`inline`]) and lower for emission ([`lower`]).
//!
//! Typical flow:
//!
//! ```
//! use midge::installer::{CompilerStorage, SnippetInstaller};
//! use midge::registry::MethodRegistry;
//!
//! let mut registry = MethodRegistry::new();
//! registry.load_json(r#"{
//!     "classes": [{
//!         "name": "rt.Ops",
//!         "methods": [{
//!             "name": "zero",
//!             "static": true,
//!             "return": { "kind": "Int" },
//!             "snippet": {},
//!             "body": { "ops": [
//!                 { "op": "const", "value": { "Int": 0 } },
//!                 { "op": "return", "value": 0 }
//!             ] }
//!         }]
//!     }]
//! }"#).unwrap();
//!
//! let storage = CompilerStorage::new();
//! let class = registry.lookup_class("rt.Ops").unwrap();
//! SnippetInstaller::new(&registry, &storage)
//!     .install_snippets(class)
//!     .unwrap();
//!
//! let zero = registry.lookup_qualified("rt.Ops", "zero").unwrap();
//! assert!(storage.graph_for(zero).is_some());
//! ```

pub mod builder;
pub mod canonicalize;
pub mod dce;
pub mod dot;
pub mod error;
pub mod graph;
pub mod inline;
pub mod installer;
pub mod intrinsify;
pub mod lower;
pub mod node;
pub mod phase;
pub mod registry;
pub mod stamp;
pub mod verify;

pub use error::{ConfigurationError, Error, GraphInternalError};
pub use graph::{Graph, NodeId};
pub use node::{Node, NodeKind};
pub use stamp::{Stamp, StampKind};
