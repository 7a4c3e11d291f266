//! Tree-walking evaluator for the guest language.
//!
//! Statements execute against a two-level namespace: assignments land in
//! the transient locals when present, otherwise directly in the persistent
//! scope. Name lookup walks locals (or, inside a call, the call frame and
//! its captured environment), then the scope, then the builtins.
//!
//! The evaluator maintains a stack of [`TraceFrame`]s, outermost-first.
//! Every fault clones the stack at the raise point so the reporter can
//! emit an innermost-first trace.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::error::TraceFrame;
use crate::redirect::{Channel, OutputSink};
use crate::value::{
    new_namespace, Builtin, ElemType, Func, MediaBundle, Namespace, NdArray, Repr, Value,
};

use super::ast::{BinOp, Expr, ExprKind, Stmt, UnaryOp};
use super::Fault;

/// Guards against unbounded guest recursion blowing the host stack.
const MAX_CALL_DEPTH: usize = 200;

/// Execute a parsed program. Assignments write into `locals` when given,
/// into `globals` otherwise.
pub fn run(
    stmts: &[Stmt],
    globals: Namespace,
    locals: Option<Namespace>,
    sink: &mut dyn OutputSink,
) -> Result<(), Fault> {
    let mut interp = Interp {
        globals: globals.clone(),
        sink,
        stack: vec![TraceFrame::new("<input>", 0)],
    };
    let chain: Vec<Namespace> = locals.iter().cloned().collect();
    let write_target = locals.unwrap_or(globals);
    for stmt in stmts {
        interp.stack[0].line = stmt.line();
        match stmt {
            Stmt::Assign { name, value, .. } => {
                let v = interp.eval(value, &chain)?;
                write_target.borrow_mut().insert(name.clone(), v);
            }
            Stmt::Expr { value, .. } => {
                interp.eval(value, &chain)?;
            }
        }
    }
    Ok(())
}

struct Interp<'a> {
    globals: Namespace,
    sink: &'a mut dyn OutputSink,
    stack: Vec<TraceFrame>,
}

impl<'a> Interp<'a> {
    fn fault(&self, line: u32, msg: impl Into<String>) -> Fault {
        let mut frames = self.stack.clone();
        if let Some(top) = frames.last_mut() {
            top.line = line;
        }
        Fault {
            msg: msg.into(),
            frames,
        }
    }

    fn lookup(&self, name: &str, chain: &[Namespace], line: u32) -> Result<Value, Fault> {
        for ns in chain {
            if let Some(v) = ns.borrow().get(name) {
                return Ok(v.clone());
            }
        }
        if let Some(v) = self.globals.borrow().get(name) {
            return Ok(v.clone());
        }
        if let Some(b) = Builtin::lookup(name) {
            return Ok(Value::builtin(b));
        }
        Err(self.fault(line, format!("name '{}' is not defined", name)))
    }

    fn eval(&mut self, expr: &Expr, chain: &[Namespace]) -> Result<Value, Fault> {
        let line = expr.line;
        match &expr.kind {
            ExprKind::None => Ok(Value::none()),
            ExprKind::Bool(b) => Ok(Value::bool(*b)),
            ExprKind::Int(v) => Ok(Value::int(*v)),
            ExprKind::Float(v) => Ok(Value::float(*v)),
            ExprKind::Str(s) => Ok(Value::str(s.clone())),
            ExprKind::Bytes(b) => Ok(Value::bytes(b.clone())),
            ExprKind::Ident(name) => self.lookup(name, chain, line),
            ExprKind::List(items) => {
                let vals = self.eval_all(items, chain)?;
                Ok(Value::list(vals))
            }
            ExprKind::Tuple(items) => {
                let vals = self.eval_all(items, chain)?;
                Ok(Value::tuple(vals))
            }
            ExprKind::Set(items) => {
                let vals = self.eval_all(items, chain)?;
                Ok(Value::set(vals))
            }
            ExprKind::Dict(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    pairs.push((self.eval(k, chain)?, self.eval(v, chain)?));
                }
                Ok(Value::dict(pairs))
            }
            ExprKind::Unary { op, operand } => {
                let v = self.eval(operand, chain)?;
                match op {
                    UnaryOp::Not => Ok(Value::bool(!v.is_truthy())),
                    UnaryOp::Neg => match v.repr_ref() {
                        Repr::Int(n) => n
                            .checked_neg()
                            .map(Value::int)
                            .ok_or_else(|| self.fault(line, "integer overflow")),
                        Repr::Float(f) => Ok(Value::float(-f)),
                        _ => Err(self.fault(
                            line,
                            format!("bad operand type for unary -: '{}'", v.type_name()),
                        )),
                    },
                }
            }
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinOp::And => {
                    let l = self.eval(lhs, chain)?;
                    if l.is_truthy() {
                        self.eval(rhs, chain)
                    } else {
                        Ok(l)
                    }
                }
                BinOp::Or => {
                    let l = self.eval(lhs, chain)?;
                    if l.is_truthy() {
                        Ok(l)
                    } else {
                        self.eval(rhs, chain)
                    }
                }
                _ => {
                    let l = self.eval(lhs, chain)?;
                    let r = self.eval(rhs, chain)?;
                    self.binop(*op, &l, &r, line)
                }
            },
            ExprKind::Index { target, index } => {
                let t = self.eval(target, chain)?;
                let i = self.eval(index, chain)?;
                self.index(&t, &i, line)
            }
            ExprKind::Fn { params, body } => {
                // Snapshot the non-global bindings visible here; innermost wins.
                let captured = new_namespace();
                {
                    let mut map = captured.borrow_mut();
                    for ns in chain.iter().rev() {
                        for (k, v) in ns.borrow().iter() {
                            map.insert(k.clone(), v.clone());
                        }
                    }
                }
                Ok(Value::func(Func {
                    params: params.clone(),
                    body: Rc::new(clone_expr(body)),
                    captured,
                }))
            }
            ExprKind::Call { callee, args } => {
                let f = self.eval(callee, chain)?;
                let arg_vals = self.eval_all(args, chain)?;
                let frame_name = match &callee.kind {
                    ExprKind::Ident(n) => n.clone(),
                    _ => "<fn>".to_string(),
                };
                self.call(&f, arg_vals, &frame_name, line)
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr], chain: &[Namespace]) -> Result<Vec<Value>, Fault> {
        let mut out = Vec::with_capacity(exprs.len());
        for e in exprs {
            out.push(self.eval(e, chain)?);
        }
        Ok(out)
    }

    fn call(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        frame_name: &str,
        line: u32,
    ) -> Result<Value, Fault> {
        match callee.repr_ref() {
            Repr::Func(f) => {
                if args.len() != f.params.len() {
                    return Err(self.fault(
                        line,
                        format!(
                            "{}() takes {} arguments, got {}",
                            frame_name,
                            f.params.len(),
                            args.len()
                        ),
                    ));
                }
                if self.stack.len() >= MAX_CALL_DEPTH {
                    return Err(self.fault(line, "maximum call depth exceeded"));
                }
                let call_ns = new_namespace();
                {
                    let mut map = call_ns.borrow_mut();
                    for (param, arg) in f.params.iter().zip(args) {
                        map.insert(param.clone(), arg);
                    }
                }
                // Pin the call site into the caller's frame, then push the
                // callee frame.
                if let Some(top) = self.stack.last_mut() {
                    top.line = line;
                }
                self.stack
                    .push(TraceFrame::new(frame_name, f.body.line));
                let chain = vec![call_ns, f.captured.clone()];
                let body = f.body.clone();
                let result = self.eval(&body, &chain);
                self.stack.pop();
                result
            }
            Repr::Builtin(b) => self.builtin(*b, args, line),
            _ => Err(self.fault(
                line,
                format!("'{}' is not callable", callee.type_name()),
            )),
        }
    }

    fn builtin(&mut self, b: Builtin, args: Vec<Value>, line: u32) -> Result<Value, Fault> {
        match b {
            Builtin::Print => {
                let mut text = args
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                text.push('\n');
                self.sink.write(Channel::Stdout, &text);
                Ok(Value::none())
            }
            Builtin::Len => {
                let [v] = one_arg(&args).map_err(|m| self.fault(line, m))?;
                let n = match v.repr_ref() {
                    Repr::Str(s) => s.chars().count(),
                    Repr::Bytes(b) => b.len(),
                    Repr::List(items) => items.borrow().len(),
                    Repr::Tuple(items) => items.len(),
                    Repr::Set(items) => items.borrow().len(),
                    Repr::Dict(entries) => entries.borrow().len(),
                    Repr::Array(arr) => arr.shape().first().copied().unwrap_or(0),
                    _ => {
                        return Err(self.fault(
                            line,
                            format!("'{}' has no length", v.type_name()),
                        ))
                    }
                };
                Ok(Value::int(n as i64))
            }
            Builtin::Str => {
                let [v] = one_arg(&args).map_err(|m| self.fault(line, m))?;
                Ok(Value::str(v.to_string()))
            }
            Builtin::Repr => {
                let [v] = one_arg(&args).map_err(|m| self.fault(line, m))?;
                Ok(Value::str(v.repr()))
            }
            Builtin::Abs => {
                let [v] = one_arg(&args).map_err(|m| self.fault(line, m))?;
                match v.repr_ref() {
                    Repr::Int(n) => n
                        .checked_abs()
                        .map(Value::int)
                        .ok_or_else(|| self.fault(line, "integer overflow")),
                    Repr::Float(f) => Ok(Value::float(f.abs())),
                    _ => Err(self.fault(
                        line,
                        format!("bad operand type for abs(): '{}'", v.type_name()),
                    )),
                }
            }
            Builtin::Min | Builtin::Max => {
                let items = spread_args(&args)
                    .ok_or_else(|| self.fault(line, "min()/max() needs at least one value"))?;
                let mut best = items[0].clone();
                for item in &items[1..] {
                    let ord = compare(item, &best).ok_or_else(|| {
                        self.fault(
                            line,
                            format!(
                                "values of type '{}' and '{}' are not orderable",
                                item.type_name(),
                                best.type_name()
                            ),
                        )
                    })?;
                    let better = match b {
                        Builtin::Min => ord == Ordering::Less,
                        _ => ord == Ordering::Greater,
                    };
                    if better {
                        best = item.clone();
                    }
                }
                Ok(best)
            }
            Builtin::Sum => {
                let [v] = one_arg(&args).map_err(|m| self.fault(line, m))?;
                let items = v
                    .seq_items()
                    .ok_or_else(|| self.fault(line, "sum() needs a sequence"))?;
                let mut acc = Value::int(0);
                for item in &items {
                    acc = self.binop(BinOp::Add, &acc, item, line)?;
                }
                Ok(acc)
            }
            Builtin::Array => {
                if args.len() != 2 {
                    return Err(self.fault(line, "array() takes (nested, code)"));
                }
                let code = match args[1].repr_ref() {
                    Repr::Str(s) => s.clone(),
                    _ => return Err(self.fault(line, "array() element code must be a str")),
                };
                let elem = ElemType::parse(&code).ok_or_else(|| {
                    self.fault(line, format!("unsupported element type '{}'", code))
                })?;
                self.build_array(&args[0], elem, line)
            }
            Builtin::Media => {
                if args.len() != 2 {
                    return Err(self.fault(line, "media() takes (mime, bytes)"));
                }
                let mime = match args[0].repr_ref() {
                    Repr::Str(s) => s.clone(),
                    _ => return Err(self.fault(line, "media() mime must be a str")),
                };
                let data = match args[1].repr_ref() {
                    Repr::Bytes(b) => b.clone(),
                    _ => return Err(self.fault(line, "media() data must be bytes")),
                };
                Ok(Value::media(MediaBundle::new(mime, data)))
            }
        }
    }

    fn build_array(&self, nested: &Value, elem: ElemType, line: u32) -> Result<Value, Fault> {
        let mut shape = Vec::new();
        let mut cursor = nested.clone();
        while let Some(items) = arr_items(&cursor) {
            shape.push(items.len());
            match items.first() {
                Some(first) => cursor = first.clone(),
                None => break,
            }
        }
        if shape.is_empty() {
            return Err(self.fault(line, "array() needs a list or tuple"));
        }
        let mut data = Vec::with_capacity(shape.iter().product::<usize>() * elem.size());
        fill_array(nested, 0, &shape, elem, &mut data).map_err(|m| self.fault(line, m))?;
        let arr = NdArray::new(elem, shape, data).map_err(|m| self.fault(line, m))?;
        Ok(Value::array(arr))
    }

    fn binop(&self, op: BinOp, l: &Value, r: &Value, line: u32) -> Result<Value, Fault> {
        let type_err = || {
            self.fault(
                line,
                format!(
                    "unsupported operand types for {}: '{}' and '{}'",
                    op.symbol(),
                    l.type_name(),
                    r.type_name()
                ),
            )
        };
        match op {
            BinOp::Eq => return Ok(Value::bool(l == r)),
            BinOp::Ne => return Ok(Value::bool(l != r)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ord = compare(l, r).ok_or_else(type_err)?;
                let res = match op {
                    BinOp::Lt => ord == Ordering::Less,
                    BinOp::Le => ord != Ordering::Greater,
                    BinOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                };
                return Ok(Value::bool(res));
            }
            _ => {}
        }
        // Arithmetic.
        match (l.repr_ref(), r.repr_ref()) {
            (Repr::Str(a), Repr::Str(b)) if op == BinOp::Add => {
                return Ok(Value::str(format!("{}{}", a, b)))
            }
            (Repr::Bytes(a), Repr::Bytes(b)) if op == BinOp::Add => {
                let mut out = a.clone();
                out.extend_from_slice(b);
                return Ok(Value::bytes(out));
            }
            (Repr::List(a), Repr::List(b)) if op == BinOp::Add => {
                let mut out = a.borrow().clone();
                out.extend(b.borrow().iter().cloned());
                return Ok(Value::list(out));
            }
            (Repr::Tuple(a), Repr::Tuple(b)) if op == BinOp::Add => {
                let mut out = a.clone();
                out.extend(b.iter().cloned());
                return Ok(Value::tuple(out));
            }
            _ => {}
        }
        let (ln, rn) = match (as_number(l), as_number(r)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(type_err()),
        };
        match (ln, rn) {
            (Num::Int(a), Num::Int(b)) => {
                let out = match op {
                    BinOp::Add => a.checked_add(b),
                    BinOp::Sub => a.checked_sub(b),
                    BinOp::Mul => a.checked_mul(b),
                    BinOp::Div => {
                        if b == 0 {
                            return Err(self.fault(line, "division by zero"));
                        }
                        return Ok(Value::float(a as f64 / b as f64));
                    }
                    BinOp::FloorDiv => {
                        if b == 0 {
                            return Err(self.fault(line, "division by zero"));
                        }
                        a.checked_div_euclid(b)
                    }
                    BinOp::Mod => {
                        if b == 0 {
                            return Err(self.fault(line, "division by zero"));
                        }
                        a.checked_rem_euclid(b)
                    }
                    _ => unreachable!("comparisons handled above"),
                };
                out.map(Value::int)
                    .ok_or_else(|| self.fault(line, "integer overflow"))
            }
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                let out = match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => {
                        if b == 0.0 {
                            return Err(self.fault(line, "division by zero"));
                        }
                        a / b
                    }
                    BinOp::FloorDiv => {
                        if b == 0.0 {
                            return Err(self.fault(line, "division by zero"));
                        }
                        (a / b).floor()
                    }
                    BinOp::Mod => {
                        if b == 0.0 {
                            return Err(self.fault(line, "division by zero"));
                        }
                        a.rem_euclid(b)
                    }
                    _ => unreachable!("comparisons handled above"),
                };
                Ok(Value::float(out))
            }
        }
    }

    fn index(&self, target: &Value, index: &Value, line: u32) -> Result<Value, Fault> {
        match target.repr_ref() {
            Repr::List(_) | Repr::Tuple(_) => {
                let items = target.seq_items().expect("sequence");
                let i = self.seq_index(index, items.len(), line)?;
                Ok(items[i].clone())
            }
            Repr::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = self.seq_index(index, chars.len(), line)?;
                Ok(Value::str(chars[i].to_string()))
            }
            Repr::Bytes(b) => {
                let i = self.seq_index(index, b.len(), line)?;
                Ok(Value::int(b[i] as i64))
            }
            Repr::Dict(entries) => {
                let entries = entries.borrow();
                entries
                    .iter()
                    .find(|(k, _)| k == index)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| self.fault(line, format!("key not found: {}", index.repr())))
            }
            _ => Err(self.fault(
                line,
                format!("'{}' is not indexable", target.type_name()),
            )),
        }
    }

    /// Resolve a (possibly negative) integer index against `len`.
    fn seq_index(&self, index: &Value, len: usize, line: u32) -> Result<usize, Fault> {
        let i = match index.repr_ref() {
            Repr::Int(v) => *v,
            _ => {
                return Err(self.fault(
                    line,
                    format!("index must be an int, not '{}'", index.type_name()),
                ))
            }
        };
        let adjusted = if i < 0 { i + len as i64 } else { i };
        if adjusted < 0 || adjusted as usize >= len {
            return Err(self.fault(line, "index out of range"));
        }
        Ok(adjusted as usize)
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(&self) -> f64 {
        match self {
            Num::Int(v) => *v as f64,
            Num::Float(v) => *v,
        }
    }
}

fn as_number(v: &Value) -> Option<Num> {
    match v.repr_ref() {
        Repr::Int(n) => Some(Num::Int(*n)),
        Repr::Bool(b) => Some(Num::Int(*b as i64)),
        Repr::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    match (l.repr_ref(), r.repr_ref()) {
        (Repr::Str(a), Repr::Str(b)) => Some(a.cmp(b)),
        (Repr::Bytes(a), Repr::Bytes(b)) => Some(a.cmp(b)),
        _ => {
            let (a, b) = (as_number(l)?, as_number(r)?);
            a.as_f64().partial_cmp(&b.as_f64())
        }
    }
}

fn one_arg(args: &[Value]) -> Result<[&Value; 1], String> {
    match args {
        [v] => Ok([v]),
        _ => Err(format!("expected 1 argument, got {}", args.len())),
    }
}

/// `min(seq)` spreads a single sequence argument; `min(a, b, ...)` uses the
/// arguments directly. Returns `None` when there is nothing to compare.
fn spread_args(args: &[Value]) -> Option<Vec<Value>> {
    let items = match args {
        [only] => only.seq_items().unwrap_or_else(|| vec![only.clone()]),
        _ => args.to_vec(),
    };
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn arr_items(v: &Value) -> Option<Vec<Value>> {
    match v.repr_ref() {
        Repr::List(items) => Some(items.borrow().clone()),
        Repr::Tuple(items) => Some(items.clone()),
        _ => None,
    }
}

fn fill_array(
    v: &Value,
    depth: usize,
    shape: &[usize],
    elem: ElemType,
    out: &mut Vec<u8>,
) -> Result<(), String> {
    if depth == shape.len() {
        return encode_scalar(elem, v, out);
    }
    let items = arr_items(v).ok_or("ragged array: nesting depth varies")?;
    if items.len() != shape[depth] {
        return Err("ragged array: row lengths differ".to_string());
    }
    for item in &items {
        fill_array(item, depth + 1, shape, elem, out)?;
    }
    Ok(())
}

fn encode_scalar(elem: ElemType, v: &Value, out: &mut Vec<u8>) -> Result<(), String> {
    let as_int = || -> Result<i64, String> {
        match v.repr_ref() {
            Repr::Int(n) => Ok(*n),
            Repr::Bool(b) => Ok(*b as i64),
            _ => Err(format!("array element is not an int: {}", v.repr())),
        }
    };
    let as_float = || -> Result<f64, String> {
        match v.repr_ref() {
            Repr::Int(n) => Ok(*n as f64),
            Repr::Float(f) => Ok(*f),
            Repr::Bool(b) => Ok(*b as i64 as f64),
            _ => Err(format!("array element is not a number: {}", v.repr())),
        }
    };
    let range_err = |what: &str| format!("array element out of range for '{}'", what);
    match elem {
        ElemType::I8 => out.extend_from_slice(
            &i8::try_from(as_int()?).map_err(|_| range_err("b"))?.to_ne_bytes(),
        ),
        ElemType::U8 => out.extend_from_slice(
            &u8::try_from(as_int()?).map_err(|_| range_err("B"))?.to_ne_bytes(),
        ),
        ElemType::I16 => out.extend_from_slice(
            &i16::try_from(as_int()?).map_err(|_| range_err("h"))?.to_ne_bytes(),
        ),
        ElemType::U16 => out.extend_from_slice(
            &u16::try_from(as_int()?).map_err(|_| range_err("H"))?.to_ne_bytes(),
        ),
        ElemType::I32 => out.extend_from_slice(
            &i32::try_from(as_int()?).map_err(|_| range_err("i"))?.to_ne_bytes(),
        ),
        ElemType::U32 => out.extend_from_slice(
            &u32::try_from(as_int()?).map_err(|_| range_err("I"))?.to_ne_bytes(),
        ),
        ElemType::I64 => out.extend_from_slice(&as_int()?.to_ne_bytes()),
        ElemType::U64 => out.extend_from_slice(
            &u64::try_from(as_int()?).map_err(|_| range_err("Q"))?.to_ne_bytes(),
        ),
        ElemType::Isize => out.extend_from_slice(
            &isize::try_from(as_int()?).map_err(|_| range_err("n"))?.to_ne_bytes(),
        ),
        ElemType::Usize => out.extend_from_slice(
            &usize::try_from(as_int()?).map_err(|_| range_err("N"))?.to_ne_bytes(),
        ),
        ElemType::F32 => out.extend_from_slice(&(as_float()? as f32).to_ne_bytes()),
        ElemType::F64 => out.extend_from_slice(&as_float()?.to_ne_bytes()),
        ElemType::Bool => out.push((as_int()? != 0) as u8),
        ElemType::F16 | ElemType::C32 | ElemType::C64 | ElemType::C128 => {
            return Err(format!(
                "cannot build an array with element type '{}'",
                elem.code()
            ))
        }
    }
    Ok(())
}

/// The AST is not `Clone` (statements are executed in place); function
/// bodies are the one place a subtree must outlive its program, so they
/// are deep-copied at closure creation.
fn clone_expr(e: &Expr) -> Expr {
    let kind = match &e.kind {
        ExprKind::None => ExprKind::None,
        ExprKind::Bool(b) => ExprKind::Bool(*b),
        ExprKind::Int(v) => ExprKind::Int(*v),
        ExprKind::Float(v) => ExprKind::Float(*v),
        ExprKind::Str(s) => ExprKind::Str(s.clone()),
        ExprKind::Bytes(b) => ExprKind::Bytes(b.clone()),
        ExprKind::Ident(n) => ExprKind::Ident(n.clone()),
        ExprKind::List(items) => ExprKind::List(items.iter().map(clone_expr).collect()),
        ExprKind::Tuple(items) => ExprKind::Tuple(items.iter().map(clone_expr).collect()),
        ExprKind::Set(items) => ExprKind::Set(items.iter().map(clone_expr).collect()),
        ExprKind::Dict(entries) => ExprKind::Dict(
            entries
                .iter()
                .map(|(k, v)| (clone_expr(k), clone_expr(v)))
                .collect(),
        ),
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op: *op,
            operand: Box::new(clone_expr(operand)),
        },
        ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
            op: *op,
            lhs: Box::new(clone_expr(lhs)),
            rhs: Box::new(clone_expr(rhs)),
        },
        ExprKind::Call { callee, args } => ExprKind::Call {
            callee: Box::new(clone_expr(callee)),
            args: args.iter().map(clone_expr).collect(),
        },
        ExprKind::Index { target, index } => ExprKind::Index {
            target: Box::new(clone_expr(target)),
            index: Box::new(clone_expr(index)),
        },
        ExprKind::Fn { params, body } => ExprKind::Fn {
            params: params.clone(),
            body: Box::new(clone_expr(body)),
        },
    };
    Expr { kind, line: e.line }
}
