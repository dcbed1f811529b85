//! The mid-level IR produced by lowering a checked AST.
//!
//! A module is a flat list of globals and functions; a function body is
//! a linear stack-machine instruction sequence shaped so that the wasm
//! backend is a direct translation. Calls and global accesses are by
//! name; indices are resolved when the target module is assembled,
//! which is what lets incremental code generation merge functions
//! emitted by separate invocations.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MirModule {
    pub name: String,
    /// Module-level mutable slots introduced by top-level `let`s.
    pub globals: Vec<String>,
    pub functions: Vec<MirFunction>,
}

impl MirModule {
    pub fn new(name: impl Into<String>) -> MirModule {
        MirModule {
            name: name.into(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&MirFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirFunction {
    pub name: String,
    pub param_count: u32,
    /// Locals beyond the parameters.
    pub local_count: u32,
    pub body: Vec<MirInst>,
    pub is_public: bool,
    /// Index of the source element this function came from, when it
    /// was lowered from a single file. Code generation uses this to
    /// honor its own start offset.
    pub source_elem: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MirInst {
    ConstInt(i64),
    ConstBool(bool),
    ConstStr(String),
    LocalGet(u32),
    LocalSet(u32),
    GlobalGet(String),
    GlobalSet(String),
    Call { callee: String, args: u32 },
    Bin(BinOp),
    Ret,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Lt,
}

impl fmt::Display for MirModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {} {{", self.name)?;
        for global in &self.globals {
            writeln!(f, "  global ${global}")?;
        }
        for func in &self.functions {
            let vis = if func.is_public { "pub " } else { "" };
            writeln!(
                f,
                "  {vis}fn @{}(params={}, locals={}) {{",
                func.name, func.param_count, func.local_count
            )?;
            for inst in &func.body {
                writeln!(f, "    {inst}")?;
            }
            writeln!(f, "  }}")?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for MirInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirInst::ConstInt(v) => write!(f, "const_int {v}"),
            MirInst::ConstBool(v) => write!(f, "const_bool {v}"),
            MirInst::ConstStr(s) => write!(f, "const_str {s:?}"),
            MirInst::LocalGet(i) => write!(f, "local_get {i}"),
            MirInst::LocalSet(i) => write!(f, "local_set {i}"),
            MirInst::GlobalGet(name) => write!(f, "global_get ${name}"),
            MirInst::GlobalSet(name) => write!(f, "global_set ${name}"),
            MirInst::Call { callee, args } => write!(f, "call @{callee} {args}"),
            MirInst::Bin(op) => write!(f, "bin {op}"),
            MirInst::Ret => write!(f, "ret"),
            MirInst::Drop => write!(f, "drop"),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Eq => "eq",
            BinOp::Lt => "lt",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_readable_dump() {
        let mut module = MirModule::new("demo");
        module.globals.push("x".to_string());
        module.functions.push(MirFunction {
            name: "main".to_string(),
            param_count: 0,
            local_count: 0,
            body: vec![
                MirInst::ConstInt(1),
                MirInst::Call {
                    callee: "print".to_string(),
                    args: 1,
                },
                MirInst::Ret,
            ],
            is_public: true,
            source_elem: Some(0),
        });
        let text = module.to_string();
        assert!(text.contains("global $x"));
        assert!(text.contains("pub fn @main"));
        assert!(text.contains("call @print 1"));
    }
}
