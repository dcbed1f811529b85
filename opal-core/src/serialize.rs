//! Module artifact serialization.
//!
//! An artifact is a single little-endian binary blob: magic, format
//! version, link name, input file list, declaration metadata, and an
//! optional embedded mid-level IR module. Writes are atomic: the blob
//! is written to a temporary file in the destination directory and
//! renamed over the target, so a failed write never leaves a partial
//! artifact behind. [`read_artifact`] is the loading side, used by the
//! module registry.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::ast::ItemKind;
use crate::context::{CompilationContext, ModuleOrFile};
use crate::error::CoreError;
use crate::mir::{BinOp, MirFunction, MirInst, MirModule};

const MAGIC: &[u8; 4] = b"OPAL";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy)]
pub struct SerializeOptions<'a> {
    pub output_path: &'a Path,
    /// When set, a human-readable declaration listing is written next
    /// to the artifact, also atomically.
    pub doc_output_path: Option<&'a Path>,
    /// The IR to embed, if any.
    pub mir: Option<&'a MirModule>,
    /// Embed private function bodies too. Off by default: consumers of
    /// a library artifact only need the public surface.
    pub serialize_all_mir: bool,
    /// The name importers will use.
    pub link_name: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Fn,
    MirFn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactDecl {
    pub kind: DeclKind,
    pub name: String,
    pub is_public: bool,
    /// Rendered type or signature, empty when checking never got to it.
    pub signature: String,
}

/// The decoded form of a serialized module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleArtifact {
    pub link_name: String,
    pub input_files: Vec<String>,
    pub decls: Vec<ArtifactDecl>,
    pub mir: Option<MirModule>,
}

impl ModuleArtifact {
    pub fn decl(&self, name: &str) -> Option<&ArtifactDecl> {
        self.decls.iter().find(|d| d.name == name)
    }
}

/// Serialize a module or a single file to `options.output_path`.
pub fn serialize(
    ctx: &CompilationContext,
    input: ModuleOrFile<'_>,
    options: SerializeOptions<'_>,
) -> Result<(), CoreError> {
    let artifact = build_artifact(ctx, input, &options);
    let mut blob = Vec::new();
    encode_artifact(&artifact, &mut blob);
    write_atomically(options.output_path, &blob)?;

    if let Some(doc_path) = options.doc_output_path {
        let mut doc = format!("module {}\n", artifact.link_name);
        for decl in artifact.decls.iter().filter(|d| d.is_public) {
            doc.push_str(&decl.name);
            if !decl.signature.is_empty() {
                doc.push_str(": ");
                doc.push_str(&decl.signature);
            }
            doc.push('\n');
        }
        write_atomically(doc_path, doc.as_bytes())?;
    }
    Ok(())
}

/// Load an artifact from disk.
pub fn read_artifact(path: &Path) -> Result<ModuleArtifact, CoreError> {
    let blob = std::fs::read(path)?;
    decode_artifact(&blob)
}

fn build_artifact(
    ctx: &CompilationContext,
    input: ModuleOrFile<'_>,
    options: &SerializeOptions<'_>,
) -> ModuleArtifact {
    let mut input_files = Vec::new();
    let mut decls = Vec::new();
    for unit in input.units() {
        input_files.push(unit.name.clone());
        for item in &unit.items {
            let decl = match &item.kind {
                ItemKind::Let(decl) => ArtifactDecl {
                    kind: DeclKind::Let,
                    name: ctx.interner.resolve(decl.name).to_string(),
                    is_public: decl.is_public,
                    signature: decl.ty.map(|t| t.to_string()).unwrap_or_default(),
                },
                ItemKind::Fn(decl) => ArtifactDecl {
                    kind: DeclKind::Fn,
                    name: ctx.interner.resolve(decl.name).to_string(),
                    is_public: decl.is_public,
                    signature: decl
                        .sig
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                },
                ItemKind::MirFn(name) => ArtifactDecl {
                    kind: DeclKind::MirFn,
                    name: ctx.interner.resolve(*name).to_string(),
                    is_public: true,
                    signature: String::new(),
                },
                ItemKind::Import(_) | ItemKind::Operator(_) | ItemKind::Stmt(_) => continue,
            };
            decls.push(decl);
        }
    }

    let mir = options.mir.map(|module| MirModule {
        name: module.name.clone(),
        globals: module.globals.clone(),
        functions: module
            .functions
            .iter()
            .filter(|f| options.serialize_all_mir || f.is_public)
            .cloned()
            .collect(),
    });

    ModuleArtifact {
        link_name: options.link_name.to_string(),
        input_files,
        decls,
        mir,
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut temp = match dir {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .map_err(|e| write_error(path, e))?;
    temp.write_all(bytes).map_err(|e| write_error(path, e))?;
    temp.persist(path)
        .map_err(|e| write_error(path, e.error))?;
    Ok(())
}

fn write_error(path: &Path, error: std::io::Error) -> CoreError {
    CoreError::ArtifactWrite {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

// Encoding. Everything little-endian; strings are a u32 length
// followed by UTF-8 bytes.

fn encode_artifact(artifact: &ModuleArtifact, out: &mut Vec<u8>) {
    out.extend_from_slice(MAGIC);
    put_u32(out, FORMAT_VERSION);
    put_str(out, &artifact.link_name);
    put_u32(out, artifact.input_files.len() as u32);
    for file in &artifact.input_files {
        put_str(out, file);
    }
    put_u32(out, artifact.decls.len() as u32);
    for decl in &artifact.decls {
        let kind = match decl.kind {
            DeclKind::Let => 0u8,
            DeclKind::Fn => 1,
            DeclKind::MirFn => 2,
        };
        out.push(kind);
        put_str(out, &decl.name);
        out.push(decl.is_public as u8);
        put_str(out, &decl.signature);
    }
    match &artifact.mir {
        None => out.push(0),
        Some(module) => {
            out.push(1);
            encode_mir(module, out);
        }
    }
}

fn encode_mir(module: &MirModule, out: &mut Vec<u8>) {
    put_str(out, &module.name);
    put_u32(out, module.globals.len() as u32);
    for global in &module.globals {
        put_str(out, global);
    }
    put_u32(out, module.functions.len() as u32);
    for func in &module.functions {
        put_str(out, &func.name);
        put_u32(out, func.param_count);
        put_u32(out, func.local_count);
        out.push(func.is_public as u8);
        match func.source_elem {
            None => out.push(0),
            Some(elem) => {
                out.push(1);
                put_u32(out, elem as u32);
            }
        }
        put_u32(out, func.body.len() as u32);
        for inst in &func.body {
            encode_inst(inst, out);
        }
    }
}

fn encode_inst(inst: &MirInst, out: &mut Vec<u8>) {
    match inst {
        MirInst::ConstInt(v) => {
            out.push(0);
            out.extend_from_slice(&v.to_le_bytes());
        }
        MirInst::ConstBool(v) => {
            out.push(1);
            out.push(*v as u8);
        }
        MirInst::ConstStr(s) => {
            out.push(2);
            put_str(out, s);
        }
        MirInst::LocalGet(i) => {
            out.push(3);
            put_u32(out, *i);
        }
        MirInst::LocalSet(i) => {
            out.push(4);
            put_u32(out, *i);
        }
        MirInst::GlobalGet(name) => {
            out.push(5);
            put_str(out, name);
        }
        MirInst::GlobalSet(name) => {
            out.push(6);
            put_str(out, name);
        }
        MirInst::Call { callee, args } => {
            out.push(7);
            put_str(out, callee);
            put_u32(out, *args);
        }
        MirInst::Bin(op) => {
            out.push(8);
            out.push(*op as u8);
        }
        MirInst::Ret => out.push(9),
        MirInst::Drop => out.push(10),
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    put_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

// Decoding.

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CoreError> {
        if self.pos + n > self.bytes.len() {
            return Err(CoreError::ArtifactFormat("unexpected end of artifact".into()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CoreError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, CoreError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i64(&mut self) -> Result<i64, CoreError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().map_err(|_| {
            CoreError::ArtifactFormat("unexpected end of artifact".into())
        })?;
        Ok(i64::from_le_bytes(bytes))
    }

    fn str(&mut self) -> Result<String, CoreError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CoreError::ArtifactFormat("artifact string is not UTF-8".into()))
    }
}

fn decode_artifact(blob: &[u8]) -> Result<ModuleArtifact, CoreError> {
    let mut r = Reader { bytes: blob, pos: 0 };
    if r.take(4)? != MAGIC {
        return Err(CoreError::ArtifactFormat("not a module artifact".into()));
    }
    let version = r.u32()?;
    if version != FORMAT_VERSION {
        return Err(CoreError::ArtifactFormat(format!(
            "unsupported artifact format version {version}"
        )));
    }
    let link_name = r.str()?;
    let input_files = (0..r.u32()?)
        .map(|_| r.str())
        .collect::<Result<Vec<_>, _>>()?;

    let decl_count = r.u32()?;
    let mut decls = Vec::with_capacity(decl_count as usize);
    for _ in 0..decl_count {
        let kind = match r.u8()? {
            0 => DeclKind::Let,
            1 => DeclKind::Fn,
            2 => DeclKind::MirFn,
            other => {
                return Err(CoreError::ArtifactFormat(format!(
                    "unknown declaration kind {other}"
                )));
            }
        };
        decls.push(ArtifactDecl {
            kind,
            name: r.str()?,
            is_public: r.u8()? != 0,
            signature: r.str()?,
        });
    }

    let mir = match r.u8()? {
        0 => None,
        1 => Some(decode_mir(&mut r)?),
        other => {
            return Err(CoreError::ArtifactFormat(format!(
                "unknown IR presence flag {other}"
            )));
        }
    };

    Ok(ModuleArtifact {
        link_name,
        input_files,
        decls,
        mir,
    })
}

fn decode_mir(r: &mut Reader<'_>) -> Result<MirModule, CoreError> {
    let name = r.str()?;
    let globals = (0..r.u32()?)
        .map(|_| r.str())
        .collect::<Result<Vec<_>, _>>()?;
    let func_count = r.u32()?;
    let mut functions = Vec::with_capacity(func_count as usize);
    for _ in 0..func_count {
        let name = r.str()?;
        let param_count = r.u32()?;
        let local_count = r.u32()?;
        let is_public = r.u8()? != 0;
        let source_elem = match r.u8()? {
            0 => None,
            _ => Some(r.u32()? as usize),
        };
        let body_len = r.u32()?;
        let mut body = Vec::with_capacity(body_len as usize);
        for _ in 0..body_len {
            body.push(decode_inst(r)?);
        }
        functions.push(MirFunction {
            name,
            param_count,
            local_count,
            body,
            is_public,
            source_elem,
        });
    }
    Ok(MirModule {
        name,
        globals,
        functions,
    })
}

fn decode_inst(r: &mut Reader<'_>) -> Result<MirInst, CoreError> {
    let inst = match r.u8()? {
        0 => MirInst::ConstInt(r.i64()?),
        1 => MirInst::ConstBool(r.u8()? != 0),
        2 => MirInst::ConstStr(r.str()?),
        3 => MirInst::LocalGet(r.u32()?),
        4 => MirInst::LocalSet(r.u32()?),
        5 => MirInst::GlobalGet(r.str()?),
        6 => MirInst::GlobalSet(r.str()?),
        7 => MirInst::Call {
            callee: r.str()?,
            args: r.u32()?,
        },
        8 => MirInst::Bin(match r.u8()? {
            0 => BinOp::Add,
            1 => BinOp::Sub,
            2 => BinOp::Mul,
            3 => BinOp::Div,
            4 => BinOp::Eq,
            5 => BinOp::Lt,
            other => {
                return Err(CoreError::ArtifactFormat(format!(
                    "unknown binary opcode {other}"
                )));
            }
        }),
        9 => MirInst::Ret,
        10 => MirInst::Drop,
        other => {
            return Err(CoreError::ArtifactFormat(format!(
                "unknown instruction opcode {other}"
            )));
        }
    };
    Ok(inst)
}
