//! # IR: the annotated program
//!
//! **Role**: The small SSA program model the annotator works on: modules of
//! functions, blocks, instructions, loops and global string data, loaded from
//! and saved to JSON.
//!
//! **Core Types**:
//! - `Module` / `Function` / `Instruction`: the program, addressed by name and id.
//! - `LoopForest`: loop nesting queries backed by `petgraph`.
//! - `namer`: stable per-function site names.

pub mod model;
pub mod namer;
pub mod walk;

pub use model::{
    BinOp, Block, Constant, FnAttrs, Function, Global, GlobalInit, Instruction, Linkage, Loop,
    Metadata, Module, Op, Param, ParamAttrs, Predicate, Type, Value, POINTER_SIZE,
};
pub use namer::{name_function, site_name, unique_name, value_site_name, NamerError};
pub use walk::LoopForest;

use std::path::{Path, PathBuf};

/// Errors from loading or saving a module.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("function {function}: loop {index}: {reason}")]
    MalformedLoop {
        function: String,
        index: usize,
        reason: &'static str,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Module {
    /// Parses a module and checks its loop structure.
    pub fn from_json(text: &str) -> Result<Module, IrError> {
        let module: Module = serde_json::from_str(text)?;
        module.validate()?;
        Ok(module)
    }

    /// Loops must name existing blocks and parents, and parent chains must end.
    pub fn validate(&self) -> Result<(), IrError> {
        for function in &self.functions {
            for (index, l) in function.loops.iter().enumerate() {
                let malformed = |reason| IrError::MalformedLoop {
                    function: function.name.clone(),
                    index,
                    reason,
                };
                if l.header >= function.blocks.len()
                    || l.blocks.iter().any(|&b| b >= function.blocks.len())
                {
                    return Err(malformed("block index out of range"));
                }
                let mut current = l.parent;
                let mut steps = 0;
                while let Some(parent) = current {
                    if parent >= function.loops.len() {
                        return Err(malformed("parent index out of range"));
                    }
                    steps += 1;
                    if parent == index || steps > function.loops.len() {
                        return Err(malformed("cyclic parent chain"));
                    }
                    current = function.loops[parent].parent;
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, IrError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Module, IrError> {
        let text = std::fs::read_to_string(path).map_err(|source| IrError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: &Path) -> Result<(), IrError> {
        let io = |source| IrError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        std::fs::write(path, self.to_json()?).map_err(io)
    }
}
