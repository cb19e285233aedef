//! Dataform project model and dependency graph
//!
//! This crate handles:
//! - Parsing `dataform compile --json` output
//! - Invoking the compiler (or substituting a fixed project)
//! - Building the definition-file dependency graph and ordering it

pub mod project;
pub mod compiler;
pub mod dag;

pub use project::{CompiledProject, TableDescriptor, Target, TargetKey, ProjectError};
pub use compiler::{ProjectCompiler, DataformCli, StaticCompiler, CompileError};
pub use dag::{DefinitionNode, GraphBuild, GraphError, GraphIssue, NodeId, ProjectGraph, TargetIndex};
