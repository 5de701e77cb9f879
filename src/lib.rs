//! Evaluates `$ref`, `$use` and `$merge` directives embedded in YAML or JSON
//! documents.
//!
//! ```no_run
//! use refeval::{eval_str, Evaluator};
//! use serde_json::json;
//!
//! let evaluator = Evaluator::builder()
//!     .local_scope(json!({"db": {"host": "localhost", "port": 5432}}))
//!     .build();
//! let out = eval_str("database: {$ref: local::db, port: 6543}", &evaluator).unwrap();
//! println!("{}", refeval::to_yaml_string(&out).unwrap());
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod directives;
pub mod engine;
pub mod errors;
pub mod merge;
pub mod node;
pub mod path;
pub mod scope;
mod comparison;
mod filter;
mod parser;

use std::io::Read;

pub use cache::{Cached, Fingerprint, RefCache};
pub use config::{CacheConfig, EvaluatorConfig};
pub use context::{DocMetadata, EvalContext};
pub use directives::{CustomDirective, Directive, Registry};
pub use engine::{Evaluator, EvaluatorBuilder, PreEval, TransformUse};
pub use errors::{BoxError, EvalError, Result};
pub use merge::{ArrayStrategy, KeyConflict, MergeOptions, Strategy};
pub use node::{Mapping, Node, Number};
pub use path::{DottedPath, PathQuery};
pub use scope::{Reference, ResourceResolver, ScopeKind};

/// Decodes a YAML (or JSON) document and evaluates it.
pub fn eval_str(input: &str, evaluator: &Evaluator) -> Result<Node> {
    let node: Node = serde_yaml::from_str(input)?;
    evaluator.eval(&node)
}

pub fn eval_bytes(input: &[u8], evaluator: &Evaluator) -> Result<Node> {
    let node: Node = serde_yaml::from_slice(input)?;
    evaluator.eval(&node)
}

pub fn eval_reader<R: Read>(reader: R, evaluator: &Evaluator) -> Result<Node> {
    let node: Node = serde_yaml::from_reader(reader)?;
    evaluator.eval(&node)
}

pub fn eval_file<P: AsRef<std::path::Path>>(path: P, evaluator: &Evaluator) -> Result<Node> {
    let file = std::fs::File::open(path)?;
    eval_reader(std::io::BufReader::new(file), evaluator)
}

/// Reads a YAML or JSON file into a [`Node`] without evaluating it.
pub fn load_file<P: AsRef<std::path::Path>>(path: P) -> Result<Node> {
    let file = std::fs::File::open(path)?;
    Ok(serde_yaml::from_reader(std::io::BufReader::new(file))?)
}

pub fn to_yaml_string(node: &Node) -> Result<String> {
    Ok(serde_yaml::to_string(node)?)
}

pub fn to_json_string(node: &Node) -> Result<String> {
    Ok(serde_json::to_string_pretty(node)?)
}
