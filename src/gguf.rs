//! GGUF header reader.
//!
//! Reads only the key/value metadata section of a GGUF file; tensor data is
//! never touched. Arrays other than the token vocabulary and per-layer head
//! counts are skipped by seeking past them.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MimirError, Result};

const MAGIC: &[u8; 4] = b"GGUF";

/// Upper bound for a single string value (chat templates are the largest).
const MAX_STRING_LEN: u64 = 16 * 1024 * 1024;

/// Upper bound for an array that is materialized rather than skipped.
const MAX_ARRAY_LEN: u64 = 16 * 1024 * 1024;

const MAX_KV_COUNT: u64 = 1 << 20;

/// Deepest array-of-arrays nesting accepted while skipping.
const MAX_ARRAY_DEPTH: usize = 8;

const TOKENS_KEY: &str = "tokenizer.ggml.tokens";

/// Metadata extracted from a GGUF model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GgufMetadata {
    pub file_path: PathBuf,
    pub file_size_bytes: u64,
    /// File size in MiB, rounded to two decimals.
    pub file_size_mb: f64,
    /// `general.architecture` (e.g. `llama`, `qwen3`).
    #[serde(default)]
    pub architecture: Option<String>,
    /// Context length the model was trained with.
    #[serde(default)]
    pub n_ctx_train: Option<u64>,
    #[serde(default)]
    pub chat_template: Option<String>,
    /// Beginning-of-sequence token text, empty when unknown.
    #[serde(default)]
    pub bos_token: String,
    /// End-of-sequence token text, empty when unknown.
    #[serde(default)]
    pub eos_token: String,
    #[serde(default)]
    pub n_layer: Option<u64>,
    #[serde(default)]
    pub n_head_kv: Option<u64>,
    #[serde(default)]
    pub head_k_size: Option<u64>,
    #[serde(default)]
    pub head_v_size: Option<u64>,
}

/// Read the metadata header of the GGUF file at `path`.
///
/// Blocking; call through [`crate::model::blocking`] from async code.
pub fn read_metadata(path: &Path) -> Result<GgufMetadata> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => MimirError::NotFound(format!("GGUF file {}", path.display())),
        _ => MimirError::from(e),
    })?;
    let file_size_bytes = file.metadata()?.len();
    read_metadata_from(BufReader::new(file), path, file_size_bytes)
}

/// Parse GGUF metadata from any seekable reader.
pub fn read_metadata_from<R: Read + Seek>(
    reader: R,
    file_path: &Path,
    file_size_bytes: u64,
) -> Result<GgufMetadata> {
    let kv = Reader::new(reader).read_header()?;
    Ok(resolve(&kv, file_path, file_size_bytes))
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Uint(u64),
    Int(i64),
    Str(String),
    Strings(Vec<String>),
    Skipped,
}

impl Value {
    fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    Bool,
    Str,
    Array,
    U64,
    I64,
    F64,
}

impl ValueType {
    fn from_u32(raw: u32) -> Result<Self> {
        Ok(match raw {
            0 => Self::U8,
            1 => Self::I8,
            2 => Self::U16,
            3 => Self::I16,
            4 => Self::U32,
            5 => Self::I32,
            6 => Self::F32,
            7 => Self::Bool,
            8 => Self::Str,
            9 => Self::Array,
            10 => Self::U64,
            11 => Self::I64,
            12 => Self::F64,
            other => {
                return Err(MimirError::InvalidGguf(format!(
                    "unknown value type {other}"
                )));
            }
        })
    }

    /// Encoded size of fixed-width types.
    fn width(self) -> Option<u64> {
        match self {
            Self::U8 | Self::I8 | Self::Bool => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::I32 | Self::F32 => Some(4),
            Self::U64 | Self::I64 | Self::F64 => Some(8),
            Self::Str | Self::Array => None,
        }
    }
}

struct Reader<R> {
    inner: R,
}

impl<R: Read + Seek> Reader<R> {
    fn new(inner: R) -> Self {
        Self { inner }
    }

    fn read_header(&mut self) -> Result<HashMap<String, Value>> {
        let mut magic = [0u8; 4];
        self.fill(&mut magic)?;
        if &magic != MAGIC {
            return Err(MimirError::InvalidGguf("bad magic".to_string()));
        }

        let version = self.u32()?;
        if !(2..=3).contains(&version) {
            return Err(MimirError::InvalidGguf(format!(
                "unsupported version {version}"
            )));
        }

        let _tensor_count = self.u64()?;
        let kv_count = self.u64()?;
        if kv_count > MAX_KV_COUNT {
            return Err(MimirError::InvalidGguf(format!(
                "implausible metadata count {kv_count}"
            )));
        }

        let mut kv = HashMap::new();
        for _ in 0..kv_count {
            let key = self.string()?;
            let ty = ValueType::from_u32(self.u32()?)?;
            let value = if ty == ValueType::Array {
                self.array(&key)?
            } else {
                self.scalar(ty)?
            };
            kv.insert(key, value);
        }
        Ok(kv)
    }

    fn scalar(&mut self, ty: ValueType) -> Result<Value> {
        Ok(match ty {
            ValueType::U8 => Value::Uint(self.bytes::<1>()?[0].into()),
            ValueType::I8 => Value::Int(i8::from_le_bytes(self.bytes()?).into()),
            ValueType::U16 => Value::Uint(u16::from_le_bytes(self.bytes()?).into()),
            ValueType::I16 => Value::Int(i16::from_le_bytes(self.bytes()?).into()),
            ValueType::U32 => Value::Uint(self.u32()?.into()),
            ValueType::I32 => Value::Int(i32::from_le_bytes(self.bytes()?).into()),
            ValueType::F32 => {
                self.bytes::<4>()?;
                Value::Skipped
            }
            ValueType::Bool => {
                self.bytes::<1>()?;
                Value::Skipped
            }
            ValueType::Str => Value::Str(self.string()?),
            ValueType::U64 => Value::Uint(self.u64()?),
            ValueType::I64 => Value::Int(i64::from_le_bytes(self.bytes()?)),
            ValueType::F64 => {
                self.bytes::<8>()?;
                Value::Skipped
            }
            ValueType::Array => self.array("")?,
        })
    }

    fn array(&mut self, key: &str) -> Result<Value> {
        let ty = ValueType::from_u32(self.u32()?)?;
        let len = self.u64()?;

        let keep_tokens = key == TOKENS_KEY && ty == ValueType::Str;
        let keep_max = is_head_count_key(key) && ty.width().is_some();
        if !keep_tokens && !keep_max {
            self.skip_array(ty, len, 1)?;
            return Ok(Value::Skipped);
        }

        if len > MAX_ARRAY_LEN {
            return Err(MimirError::InvalidGguf(format!(
                "array '{key}' too long ({len})"
            )));
        }

        if keep_tokens {
            let mut tokens = Vec::with_capacity(len as usize);
            for _ in 0..len {
                tokens.push(self.string()?);
            }
            return Ok(Value::Strings(tokens));
        }

        // Per-layer head counts collapse to their maximum.
        let mut max: Option<u64> = None;
        for _ in 0..len {
            if let Some(v) = self.scalar(ty)?.as_u64() {
                max = Some(max.map_or(v, |m| m.max(v)));
            }
        }
        Ok(max.map_or(Value::Skipped, Value::Uint))
    }

    fn skip_array(&mut self, ty: ValueType, len: u64, depth: usize) -> Result<()> {
        if depth > MAX_ARRAY_DEPTH {
            return Err(MimirError::InvalidGguf(
                "array nesting too deep".to_string(),
            ));
        }
        match ty.width() {
            Some(width) => {
                let bytes = len
                    .checked_mul(width)
                    .and_then(|b| i64::try_from(b).ok())
                    .ok_or_else(|| MimirError::InvalidGguf("array size overflow".to_string()))?;
                self.inner.seek(SeekFrom::Current(bytes))?;
            }
            None if ty == ValueType::Str => {
                for _ in 0..len {
                    self.skip_string()?;
                }
            }
            None => {
                for _ in 0..len {
                    let inner_ty = ValueType::from_u32(self.u32()?)?;
                    let inner_len = self.u64()?;
                    self.skip_array(inner_ty, inner_len, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    fn string_len(&mut self) -> Result<u64> {
        let len = self.u64()?;
        if len > MAX_STRING_LEN {
            return Err(MimirError::InvalidGguf(format!(
                "string length {len} exceeds limit"
            )));
        }
        Ok(len)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.string_len()?;
        let mut buf = vec![0u8; len as usize];
        self.fill(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn skip_string(&mut self) -> Result<()> {
        let len = self.string_len()?;
        self.inner.seek(SeekFrom::Current(len as i64))?;
        Ok(())
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.bytes()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.bytes()?))
    }

    fn bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                MimirError::InvalidGguf("unexpected end of file".to_string())
            }
            _ => MimirError::from(e),
        })
    }
}

fn is_head_count_key(key: &str) -> bool {
    key.ends_with(".attention.head_count_kv") || key.ends_with(".attention.head_count")
}

fn resolve(kv: &HashMap<String, Value>, file_path: &Path, file_size_bytes: u64) -> GgufMetadata {
    let architecture = kv
        .get("general.architecture")
        .and_then(Value::as_str)
        .map(str::to_string);
    let arch = architecture.as_deref().unwrap_or("llama");
    let uint = |suffix: &str| kv.get(&format!("{arch}.{suffix}")).and_then(Value::as_u64);

    let head_count = uint("attention.head_count");
    let head_dim = match (uint("embedding_length"), head_count) {
        (Some(embd), Some(heads)) if heads > 0 => Some(embd / heads),
        _ => None,
    };

    let tokens = match kv.get(TOKENS_KEY) {
        Some(Value::Strings(tokens)) => tokens.as_slice(),
        _ => &[],
    };
    let token = |id_key: &str| {
        kv.get(id_key)
            .and_then(Value::as_u64)
            .and_then(|id| tokens.get(usize::try_from(id).ok()?))
            .cloned()
            .unwrap_or_default()
    };

    GgufMetadata {
        file_path: file_path.to_path_buf(),
        file_size_bytes,
        file_size_mb: (file_size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        n_ctx_train: uint("context_length"),
        chat_template: kv
            .get("tokenizer.chat_template")
            .and_then(Value::as_str)
            .map(str::to_string),
        bos_token: token("tokenizer.ggml.bos_token_id"),
        eos_token: token("tokenizer.ggml.eos_token_id"),
        n_layer: uint("block_count"),
        n_head_kv: uint("attention.head_count_kv").or(head_count),
        head_k_size: uint("attention.key_length").or(head_dim),
        head_v_size: uint("attention.value_length").or(head_dim),
        architecture,
    }
}
