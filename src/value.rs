//! Runtime value model shared by the interpreter and the marshaling engine.
//!
//! `Value` is a cheap handle over an `Rc`-backed representation. Cloning a
//! `Value` shares the allocation, which gives every value a stable identity
//! (the allocation address) for the lifetime of its clones. The reference
//! table keys on that identity, never on structural equality: two equal but
//! separately constructed values have distinct identities.
//!
//! Mutable containers (`list`, `set`, `dict`) use interior mutability so
//! that values resident in a session scope can be updated in place through
//! handles. Access is single-threaded by construction (see `session`).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::interp::ast::Expr;

/// Named persistent namespace; also the shape of transient locals and of
/// closure captures.
pub type Namespace = Rc<RefCell<HashMap<String, Value>>>;

pub fn new_namespace() -> Namespace {
    Rc::new(RefCell::new(HashMap::new()))
}

/// A guest runtime value.
#[derive(Clone)]
pub struct Value(Rc<Repr>);

#[derive(Debug)]
pub enum Repr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(RefCell<Vec<Value>>),
    Tuple(Vec<Value>),
    /// Insertion-ordered, deduplicated by structural equality.
    Set(RefCell<Vec<Value>>),
    /// Insertion-ordered key/value pairs, keys unique by structural equality.
    Dict(RefCell<Vec<(Value, Value)>>),
    Array(NdArray),
    Media(MediaBundle),
    Func(Func),
    Builtin(Builtin),
}

/// An anonymous guest function with its captured environment.
#[derive(Debug)]
pub struct Func {
    pub params: Vec<String>,
    pub body: Rc<Expr>,
    /// Snapshot of the non-global bindings visible at creation time.
    pub captured: Namespace,
}

/// Builtin functions resolvable by bare name when no binding shadows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Str,
    Repr,
    Abs,
    Min,
    Max,
    Sum,
    Array,
    Media,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        Some(match name {
            "print" => Builtin::Print,
            "len" => Builtin::Len,
            "str" => Builtin::Str,
            "repr" => Builtin::Repr,
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "sum" => Builtin::Sum,
            "array" => Builtin::Array,
            "media" => Builtin::Media,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Repr => "repr",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Array => "array",
            Builtin::Media => "media",
        }
    }
}

impl Value {
    pub fn none() -> Value {
        Value(Rc::new(Repr::None))
    }

    pub fn bool(b: bool) -> Value {
        Value(Rc::new(Repr::Bool(b)))
    }

    pub fn int(v: i64) -> Value {
        Value(Rc::new(Repr::Int(v)))
    }

    pub fn float(v: f64) -> Value {
        Value(Rc::new(Repr::Float(v)))
    }

    pub fn str(s: impl Into<String>) -> Value {
        Value(Rc::new(Repr::Str(s.into())))
    }

    pub fn bytes(b: Vec<u8>) -> Value {
        Value(Rc::new(Repr::Bytes(b)))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value(Rc::new(Repr::List(RefCell::new(items))))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value(Rc::new(Repr::Tuple(items)))
    }

    /// Builds a set, dropping structural duplicates while keeping insertion
    /// order of first occurrence.
    pub fn set(items: Vec<Value>) -> Value {
        let mut unique: Vec<Value> = Vec::with_capacity(items.len());
        for item in items {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Value(Rc::new(Repr::Set(RefCell::new(unique))))
    }

    /// Builds a dict; a repeated key overwrites the earlier value, keeping
    /// the original position.
    pub fn dict(pairs: Vec<(Value, Value)>) -> Value {
        let mut entries: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            if let Some(slot) = entries.iter_mut().find(|(ek, _)| *ek == k) {
                slot.1 = v;
            } else {
                entries.push((k, v));
            }
        }
        Value(Rc::new(Repr::Dict(RefCell::new(entries))))
    }

    pub fn array(arr: NdArray) -> Value {
        Value(Rc::new(Repr::Array(arr)))
    }

    pub fn media(bundle: MediaBundle) -> Value {
        Value(Rc::new(Repr::Media(bundle)))
    }

    pub fn func(f: Func) -> Value {
        Value(Rc::new(Repr::Func(f)))
    }

    pub fn builtin(b: Builtin) -> Value {
        Value(Rc::new(Repr::Builtin(b)))
    }

    pub fn repr_ref(&self) -> &Repr {
        &self.0
    }

    /// Process-unique identity key: the address of the shared allocation.
    /// Stable for as long as any clone of this value is alive.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const u8 as usize
    }

    pub fn type_name(&self) -> &'static str {
        match &*self.0 {
            Repr::None => "none",
            Repr::Bool(_) => "bool",
            Repr::Int(_) => "int",
            Repr::Float(_) => "float",
            Repr::Str(_) => "str",
            Repr::Bytes(_) => "bytes",
            Repr::List(_) => "list",
            Repr::Tuple(_) => "tuple",
            Repr::Set(_) => "set",
            Repr::Dict(_) => "dict",
            Repr::Array(_) => "array",
            Repr::Media(_) => "media",
            Repr::Func(_) => "fn",
            Repr::Builtin(_) => "builtin",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match &*self.0 {
            Repr::None => false,
            Repr::Bool(b) => *b,
            Repr::Int(v) => *v != 0,
            Repr::Float(v) => *v != 0.0,
            Repr::Str(s) => !s.is_empty(),
            Repr::Bytes(b) => !b.is_empty(),
            Repr::List(items) => !items.borrow().is_empty(),
            Repr::Tuple(items) => !items.is_empty(),
            Repr::Set(items) => !items.borrow().is_empty(),
            Repr::Dict(entries) => !entries.borrow().is_empty(),
            Repr::Array(arr) => arr.len() != 0,
            Repr::Media(_) | Repr::Func(_) | Repr::Builtin(_) => true,
        }
    }

    /// Ordered element snapshot for sequence-shaped values.
    pub fn seq_items(&self) -> Option<Vec<Value>> {
        match &*self.0 {
            Repr::List(items) => Some(items.borrow().clone()),
            Repr::Tuple(items) => Some(items.clone()),
            Repr::Set(items) => Some(items.borrow().clone()),
            _ => None,
        }
    }

    /// Source-style rendering: strings quoted, containers recursive.
    pub fn repr(&self) -> String {
        match &*self.0 {
            Repr::None => "none".to_string(),
            Repr::Bool(true) => "true".to_string(),
            Repr::Bool(false) => "false".to_string(),
            Repr::Int(v) => v.to_string(),
            Repr::Float(v) => format!("{:?}", v),
            Repr::Str(s) => quote_str(s),
            Repr::Bytes(b) => quote_bytes(b),
            Repr::List(items) => {
                let inner: Vec<String> = items.borrow().iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Repr::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                if inner.len() == 1 {
                    format!("({},)", inner[0])
                } else {
                    format!("({})", inner.join(", "))
                }
            }
            Repr::Set(items) => {
                let inner: Vec<String> = items.borrow().iter().map(Value::repr).collect();
                format!("{{{}}}", inner.join(", "))
            }
            Repr::Dict(entries) => {
                let inner: Vec<String> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Repr::Array(arr) => {
                format!("array({:?}, shape={:?})", arr.elem().code(), arr.shape())
            }
            Repr::Media(bundle) => {
                let mimes: Vec<&str> = bundle.mimes().collect();
                format!("media({})", mimes.join(", "))
            }
            Repr::Func(f) => format!("<fn ({})>", f.params.join(", ")),
            Repr::Builtin(b) => format!("<builtin {}>", b.name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Repr::Str(s) => f.write_str(s),
            _ => f.write_str(&self.repr()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        match (&*self.0, &*other.0) {
            (Repr::None, Repr::None) => true,
            (Repr::Bool(a), Repr::Bool(b)) => a == b,
            (Repr::Int(a), Repr::Int(b)) => a == b,
            (Repr::Float(a), Repr::Float(b)) => a == b,
            (Repr::Int(a), Repr::Float(b)) | (Repr::Float(b), Repr::Int(a)) => *a as f64 == *b,
            (Repr::Str(a), Repr::Str(b)) => a == b,
            (Repr::Bytes(a), Repr::Bytes(b)) => a == b,
            (Repr::List(a), Repr::List(b)) => *a.borrow() == *b.borrow(),
            (Repr::Tuple(a), Repr::Tuple(b)) => a == b,
            (Repr::Set(a), Repr::Set(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().all(|x| b.contains(x))
            }
            (Repr::Dict(a), Repr::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(bk, bv)| bk == k && bv == v))
            }
            (Repr::Array(a), Repr::Array(b)) => {
                a.elem() == b.elem() && a.shape() == b.shape() && a.data() == b.data()
            }
            // Functions, builtins, media: identity only (handled by ptr_eq).
            _ => false,
        }
    }
}

/// Element types accepted for `buffer`/`array` payloads.
///
/// This is a fixed whitelist; anything outside it fails marshaling. Codes
/// follow the struct-format character convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    /// Pointer-width signed.
    Isize,
    /// Pointer-width unsigned.
    Usize,
    F16,
    F32,
    F64,
    Bool,
    /// Complex of two half floats.
    C32,
    /// Complex of two single floats.
    C64,
    /// Complex of two double floats.
    C128,
}

impl ElemType {
    pub fn parse(code: &str) -> Option<ElemType> {
        Some(match code {
            "b" => ElemType::I8,
            "B" => ElemType::U8,
            "h" => ElemType::I16,
            "H" => ElemType::U16,
            "i" => ElemType::I32,
            "I" => ElemType::U32,
            "q" => ElemType::I64,
            "Q" => ElemType::U64,
            "n" => ElemType::Isize,
            "N" => ElemType::Usize,
            "e" => ElemType::F16,
            "f" => ElemType::F32,
            "d" => ElemType::F64,
            "?" => ElemType::Bool,
            "Ze" => ElemType::C32,
            "Zf" => ElemType::C64,
            "Zd" => ElemType::C128,
            _ => return None,
        })
    }

    pub fn code(&self) -> &'static str {
        match self {
            ElemType::I8 => "b",
            ElemType::U8 => "B",
            ElemType::I16 => "h",
            ElemType::U16 => "H",
            ElemType::I32 => "i",
            ElemType::U32 => "I",
            ElemType::I64 => "q",
            ElemType::U64 => "Q",
            ElemType::Isize => "n",
            ElemType::Usize => "N",
            ElemType::F16 => "e",
            ElemType::F32 => "f",
            ElemType::F64 => "d",
            ElemType::Bool => "?",
            ElemType::C32 => "Ze",
            ElemType::C64 => "Zf",
            ElemType::C128 => "Zd",
        }
    }

    pub fn size(&self) -> usize {
        match self {
            ElemType::I8 | ElemType::U8 | ElemType::Bool => 1,
            ElemType::I16 | ElemType::U16 | ElemType::F16 => 2,
            ElemType::I32 | ElemType::U32 | ElemType::F32 | ElemType::C32 => 4,
            ElemType::I64 | ElemType::U64 | ElemType::F64 | ElemType::C64 => 8,
            ElemType::Isize | ElemType::Usize => std::mem::size_of::<isize>(),
            ElemType::C128 => 16,
        }
    }
}

/// Homogeneous n-dimensional numeric array. Data is stored row-major;
/// the wire layer requests column-major bytes explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    elem: ElemType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl NdArray {
    /// Fails (with a message for the caller to wrap) if `data` does not
    /// hold exactly `product(shape)` elements.
    pub fn new(elem: ElemType, shape: Vec<usize>, data: Vec<u8>) -> Result<NdArray, String> {
        let expected = shape.iter().product::<usize>() * elem.size();
        if data.len() != expected {
            return Err(format!(
                "array data is {} bytes, shape {:?} of '{}' needs {}",
                data.len(),
                shape,
                elem.code(),
                expected
            ));
        }
        Ok(NdArray { elem, shape, data })
    }

    pub fn elem(&self) -> ElemType {
        self.elem
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn itemsize(&self) -> usize {
        self.elem.size()
    }

    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes in column-major (first axis fastest) order, independent of
    /// the in-memory layout.
    pub fn column_major_bytes(&self) -> Vec<u8> {
        let ndim = self.shape.len();
        if ndim <= 1 {
            return self.data.clone();
        }
        let isz = self.elem.size();
        let count = self.len();
        // Row-major strides in elements.
        let mut strides = vec![1usize; ndim];
        for axis in (0..ndim - 1).rev() {
            strides[axis] = strides[axis + 1] * self.shape[axis + 1];
        }
        let mut out = Vec::with_capacity(count * isz);
        let mut index = vec![0usize; ndim];
        for _ in 0..count {
            let linear: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
            out.extend_from_slice(&self.data[linear * isz..(linear + 1) * isz]);
            // Advance in column-major order: first axis varies fastest.
            for axis in 0..ndim {
                index[axis] += 1;
                if index[axis] < self.shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        out
    }
}

/// A bundle of pre-rendered MIME representations carried by a value.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaBundle {
    reprs: Vec<(String, Vec<u8>)>,
}

impl MediaBundle {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> MediaBundle {
        MediaBundle {
            reprs: vec![(mime.into(), data)],
        }
    }

    pub fn get(&self, mime: &str) -> Option<&[u8]> {
        self.reprs
            .iter()
            .find(|(m, _)| m == mime)
            .map(|(_, d)| d.as_slice())
    }

    pub fn mimes(&self) -> impl Iterator<Item = &str> {
        self.reprs.iter().map(|(m, _)| m.as_str())
    }
}

/// Python-style hex rendering of an integer: lowercase, magnitude form
/// with a leading sign for negatives.
pub fn hex_int(v: i64) -> String {
    if v < 0 {
        format!("-{:#x}", v.unsigned_abs())
    } else {
        format!("{:#x}", v)
    }
}


fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn quote_bytes(b: &[u8]) -> String {
    let mut out = String::from("b\"");
    for &byte in b {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out.push('"');
    out
}
