/// A transient annotation candidate, as presented to the oracle.
///
/// Names are assigned by the site namer before resolution; the oracle only
/// needs the owning function and the stable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site<'a> {
    Parameter { function: &'a str, name: &'a str },
    /// The function itself (function-level kinds).
    Function { function: &'a str },
    Instruction { function: &'a str, name: &'a str },
    LoopHeader { function: &'a str, header: &'a str },
    /// A value whose comparison outcome is speculated (load, call or parameter).
    BranchValue { function: &'a str, name: &'a str },
}

impl<'a> Site<'a> {
    pub fn owner(&self) -> &'a str {
        match *self {
            Site::Parameter { function, .. }
            | Site::Function { function }
            | Site::Instruction { function, .. }
            | Site::LoopHeader { function, .. }
            | Site::BranchValue { function, .. } => function,
        }
    }

    /// Stable name used as the name-cache key.
    pub fn name(&self) -> &'a str {
        match *self {
            Site::Function { function } => function,
            Site::Parameter { name, .. }
            | Site::Instruction { name, .. }
            | Site::BranchValue { name, .. } => name,
            Site::LoopHeader { header, .. } => header,
        }
    }
}
