//! Lowering of method bodies into the `shapecode::ir` instruction list.
//!
//! The lowering is deliberately small. It tracks data flow between parameters, locals and
//! fields precisely, and gives up on everything else: unknown expressions become `Opaque`,
//! control flow and macro calls become `Branch` / `Label`. A binding changed in place, through
//! `&mut` or a method receiver, is overwritten with `Opaque`. Every expression pushes exactly
//! one value.

use std::collections::HashMap;

use proc_macro2::TokenStream;
use quote::{ToTokens, format_ident, quote};
use syn::visit::Visit;
use syn::{
    BinOp, Block, Expr, ExprStruct, FnArg, Local, Member, Pat, Path, Signature, Stmt, UnOp,
};

/// Method calls known to leave their receiver untouched. Any other call may take `&mut self`,
/// so its receiver is forgotten afterwards.
const NON_MUTATING_CALLS: &[&str] =
    &["clone", "to_owned", "as_str", "as_slice", "as_ref", "borrow"];

/// One lowered instruction. Mirrors `shapecode::ir::Insn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    LoadSelf,
    LoadParam(usize),
    LoadLocal(usize),
    StoreLocal(usize),
    LoadConst,
    GetField(String),
    PutField(String),
    Binary(&'static str),
    Unary(&'static str),
    Cast,
    Invoke { name: String, argc: usize },
    Pop,
    Opaque,
    Branch,
    Label,
    Return,
}

impl ToTokens for Op {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let insn = quote!(::shapecode::ir::Insn);
        let expanded = match self {
            Op::LoadSelf => quote!(#insn::LoadSelf),
            Op::LoadParam(i) => quote!(#insn::LoadParam(#i)),
            Op::LoadLocal(slot) => quote!(#insn::LoadLocal(#slot)),
            Op::StoreLocal(slot) => quote!(#insn::StoreLocal(#slot)),
            Op::LoadConst => quote!(#insn::LoadConst),
            Op::GetField(name) => quote!(#insn::GetField(#name)),
            Op::PutField(name) => quote!(#insn::PutField(#name)),
            Op::Binary(op) => {
                let op = format_ident!("{}", op);
                quote!(#insn::Binary(::shapecode::ir::BinaryOp::#op))
            }
            Op::Unary(op) => {
                let op = format_ident!("{}", op);
                quote!(#insn::Unary(::shapecode::ir::UnaryOp::#op))
            }
            Op::Cast => quote!(#insn::Cast),
            Op::Invoke { name, argc } => quote!(#insn::Invoke { name: #name, argc: #argc }),
            Op::Pop => quote!(#insn::Pop),
            Op::Opaque => quote!(#insn::Opaque),
            Op::Branch => quote!(#insn::Branch),
            Op::Label => quote!(#insn::Label),
            Op::Return => quote!(#insn::Return),
        };
        tokens.extend(expanded);
    }
}

/// Lowers the body of a constructor candidate.
pub(crate) fn lower_constructor(sig: &Signature, body: &Block, type_name: &str) -> Vec<Op> {
    let mut lowerer = Lowerer::new(type_name);
    lowerer.constructor = true;

    for (index, input) in sig.inputs.iter().enumerate() {
        let FnArg::Typed(arg) = input else { continue };
        match &*arg.pat {
            Pat::Ident(pat) if pat.subpat.is_none() && pat.by_ref.is_none() => {
                let name = pat.ident.to_string();
                if pat.mutability.is_some() {
                    // A reassignable parameter lives in a local slot from the start.
                    let slot = lowerer.fresh_slot();
                    lowerer.emit(Op::LoadParam(index));
                    lowerer.emit(Op::StoreLocal(slot));
                    lowerer.locals.insert(name, Some(slot));
                } else {
                    lowerer.params.insert(name, index);
                }
            }
            other => lowerer.bind_unknown(other),
        }
    }

    lowerer.finish(body)
}

/// Lowers the body of a `&self` method. Method parameters carry no provenance.
pub(crate) fn lower_method(sig: &Signature, body: &Block, type_name: &str) -> Vec<Op> {
    let mut lowerer = Lowerer::new(type_name);
    for input in &sig.inputs {
        if let FnArg::Typed(arg) = input {
            lowerer.bind_unknown(&arg.pat);
        }
    }
    lowerer.finish(body)
}

/// The name a parameter is recorded under.
pub(crate) fn param_name(pat: &Pat) -> String {
    match pat {
        Pat::Ident(pat) => pat.ident.to_string(),
        Pat::Type(typed) => param_name(&typed.pat),
        _ => "_".to_string(),
    }
}

struct Lowerer<'a> {
    type_name: &'a str,
    params: HashMap<String, usize>,
    /// Local name → slot. `None` marks a binding without tracked provenance.
    locals: HashMap<String, Option<usize>>,
    /// Set while lowering a constructor. Accessors borrow `&self` and change nothing.
    constructor: bool,
    /// Parameters changed in place. Their current value lives in the slot.
    moved: HashMap<String, usize>,
    next_slot: usize,
    ops: Vec<Op>,
}

impl<'a> Lowerer<'a> {
    fn new(type_name: &'a str) -> Self {
        Self {
            type_name,
            params: HashMap::new(),
            locals: HashMap::new(),
            moved: HashMap::new(),
            constructor: false,
            next_slot: 0,
            ops: Vec::new(),
        }
    }

    fn finish(mut self, body: &Block) -> Vec<Op> {
        self.block(body);
        self.emit(Op::Return);
        self.ops
    }

    fn emit(&mut self, op: Op) {
        self.ops.push(op);
    }

    fn fresh_slot(&mut self) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    fn bind_unknown(&mut self, pat: &Pat) {
        let mut bindings = Bindings::default();
        bindings.visit_pat(pat);
        for name in bindings.0 {
            self.locals.insert(name, None);
        }
    }

    /// Forgets the value behind `target` after it was changed in place: through `&mut`, or
    /// as the receiver of a call that may take `&mut self`.
    fn clobber(&mut self, target: &Expr) {
        if !self.constructor {
            return;
        }
        match strip(target) {
            Expr::Path(path) if path.qself.is_none() => {
                let Some(ident) = path.path.get_ident() else {
                    return;
                };
                let name = ident.to_string();
                let slot = match self.locals.get(&name) {
                    Some(Some(slot)) => *slot,
                    Some(None) => return,
                    None => match self.moved.get(&name) {
                        Some(slot) => *slot,
                        None if self.params.contains_key(&name) => {
                            let slot = self.fresh_slot();
                            self.moved.insert(name, slot);
                            slot
                        }
                        None => return,
                    },
                };
                self.emit(Op::Opaque);
                self.emit(Op::StoreLocal(slot));
            }
            Expr::Field(field) => {
                self.expr(&field.base);
                self.emit(Op::Opaque);
                self.emit(Op::PutField(member_name(&field.member)));
            }
            _ => {}
        }
    }

    /// `Self`, or the implementing type by name.
    fn is_self_path(&self, path: &Path) -> bool {
        path.is_ident("Self") || path.is_ident(self.type_name)
    }

    fn block(&mut self, block: &Block) {
        let saved = self.locals.clone();
        let mut produced = false;
        let count = block.stmts.len();

        for (i, stmt) in block.stmts.iter().enumerate() {
            match stmt {
                Stmt::Local(local) => self.local(local),
                Stmt::Item(_) => {}
                Stmt::Expr(expr, None) if i + 1 == count => {
                    self.expr(expr);
                    produced = true;
                }
                Stmt::Expr(expr, _) => {
                    self.expr(expr);
                    self.emit(Op::Pop);
                }
                Stmt::Macro(mac) => {
                    // A macro may assign, branch or return; nothing survives it.
                    self.emit(Op::Branch);
                    self.emit(Op::Label);
                    if mac.semi_token.is_none() && i + 1 == count {
                        self.emit(Op::Opaque);
                        produced = true;
                    }
                }
            }
        }

        if !produced {
            self.emit(Op::LoadConst);
        }
        self.locals = saved;
    }

    fn local(&mut self, local: &Local) {
        let Some(init) = &local.init else {
            self.bind_unknown(&local.pat);
            return;
        };

        self.expr(&init.expr);

        if let Some((_, diverge)) = &init.diverge {
            self.emit(Op::Pop);
            self.emit(Op::Branch);
            self.expr(diverge);
            self.emit(Op::Pop);
            self.emit(Op::Label);
            self.bind_unknown(&local.pat);
            return;
        }

        match simple_binding(&local.pat) {
            Some(name) => {
                let slot = self.fresh_slot();
                self.emit(Op::StoreLocal(slot));
                self.locals.insert(name, Some(slot));
            }
            None => {
                self.emit(Op::Pop);
                self.bind_unknown(&local.pat);
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Lit(_) | Expr::Const(_) => self.emit(Op::LoadConst),
            Expr::Path(path) => self.path(path),
            Expr::Struct(lit) => self.struct_literal(lit),
            Expr::Field(field) => {
                self.expr(&field.base);
                self.emit(Op::GetField(member_name(&field.member)));
            }
            Expr::Reference(r) => {
                self.expr(&r.expr);
                if r.mutability.is_some() {
                    self.clobber(&r.expr);
                }
            }
            Expr::Paren(p) => self.expr(&p.expr),
            Expr::Group(g) => self.expr(&g.expr),
            Expr::Unary(unary) => {
                self.expr(&unary.expr);
                match unary.op {
                    UnOp::Deref(_) => {}
                    UnOp::Neg(_) => self.emit(Op::Unary("Neg")),
                    UnOp::Not(_) => self.emit(Op::Unary("Not")),
                    _ => {
                        self.emit(Op::Pop);
                        self.emit(Op::Opaque);
                    }
                }
            }
            Expr::Binary(binary) => match binary_op(&binary.op) {
                Some((op, false)) => {
                    self.expr(&binary.left);
                    self.expr(&binary.right);
                    self.emit(Op::Binary(op));
                }
                Some((op, true)) => {
                    self.assign(&binary.left, |this| {
                        this.expr(&binary.left);
                        this.expr(&binary.right);
                        this.emit(Op::Binary(op));
                    });
                }
                None => {
                    self.expr(&binary.left);
                    self.expr(&binary.right);
                    self.emit(Op::Pop);
                    self.emit(Op::Pop);
                    self.emit(Op::Opaque);
                }
            },
            Expr::Assign(assign) => self.assign(&assign.left, |this| this.expr(&assign.right)),
            Expr::Cast(cast) => {
                self.expr(&cast.expr);
                self.emit(Op::Cast);
            }
            Expr::MethodCall(call) => {
                self.expr(&call.receiver);
                for arg in &call.args {
                    self.expr(arg);
                }
                let name = call.method.to_string();
                let mutates = !NON_MUTATING_CALLS.contains(&name.as_str());
                self.emit(Op::Invoke {
                    name,
                    argc: 1 + call.args.len(),
                });
                if mutates {
                    self.clobber(&call.receiver);
                }
            }
            Expr::Call(call) => self.call(call),
            Expr::Index(index) => {
                self.expr(&index.expr);
                self.expr(&index.index);
                self.invoke("index", 2);
            }
            Expr::Tuple(tuple) if tuple.elems.is_empty() => self.emit(Op::LoadConst),
            Expr::Tuple(tuple) => {
                for elem in &tuple.elems {
                    self.expr(elem);
                }
                self.invoke("tuple", tuple.elems.len());
            }
            Expr::Array(array) => {
                for elem in &array.elems {
                    self.expr(elem);
                }
                self.invoke("array", array.elems.len());
            }
            Expr::Repeat(repeat) => {
                self.expr(&repeat.expr);
                self.invoke("array", 1);
            }
            Expr::Range(range) => {
                let mut argc = 0;
                for bound in [&range.start, &range.end].into_iter().flatten() {
                    self.expr(bound);
                    argc += 1;
                }
                self.invoke("range", argc);
            }
            Expr::Block(block) => self.block(&block.block),
            Expr::Unsafe(block) => self.block(&block.block),
            Expr::If(_)
            | Expr::Match(_)
            | Expr::While(_)
            | Expr::ForLoop(_)
            | Expr::Loop(_)
            | Expr::Try(_)
            | Expr::Return(_)
            | Expr::Break(_)
            | Expr::Continue(_)
            | Expr::Let(_) => self.control_flow(expr),
            Expr::Macro(_) => {
                self.emit(Op::Branch);
                self.emit(Op::Label);
                self.emit(Op::Opaque);
            }
            _ => self.emit(Op::Opaque),
        }
    }

    fn invoke(&mut self, name: &str, argc: usize) {
        self.emit(Op::Invoke {
            name: name.to_string(),
            argc,
        });
    }

    fn path(&mut self, path: &syn::ExprPath) {
        if path.qself.is_none() {
            if let Some(ident) = path.path.get_ident() {
                let name = ident.to_string();
                if name == "self" {
                    return self.emit(Op::LoadSelf);
                }
                if let Some(binding) = self.locals.get(&name) {
                    let op = binding.map_or(Op::Opaque, Op::LoadLocal);
                    return self.emit(op);
                }
                if let Some(slot) = self.moved.get(&name) {
                    return self.emit(Op::LoadLocal(*slot));
                }
                if let Some(index) = self.params.get(&name) {
                    return self.emit(Op::LoadParam(*index));
                }
            }
        }
        // Constants, statics, unit variants and function items.
        self.emit(Op::LoadConst);
    }

    fn struct_literal(&mut self, lit: &ExprStruct) {
        if lit.qself.is_some() || !self.is_self_path(&lit.path) {
            for field in &lit.fields {
                self.expr(&field.expr);
            }
            let mut argc = lit.fields.len();
            if let Some(rest) = &lit.rest {
                self.expr(rest);
                argc += 1;
            }
            return self.invoke("struct", argc);
        }

        for field in &lit.fields {
            self.emit(Op::LoadSelf);
            self.expr(&field.expr);
            self.emit(Op::PutField(member_name(&field.member)));
        }
        if let Some(rest) = &lit.rest {
            self.expr(rest);
            self.emit(Op::Pop);
        }
        self.emit(Op::LoadSelf);
    }

    fn call(&mut self, call: &syn::ExprCall) {
        let Expr::Path(func) = &*call.func else {
            self.expr(&call.func);
            for arg in &call.args {
                self.expr(arg);
            }
            return self.invoke("call", call.args.len() + 1);
        };

        // Tuple struct construction: `Self(a, b)`.
        if func.qself.is_none() && self.is_self_path(&func.path) {
            for (i, arg) in call.args.iter().enumerate() {
                self.emit(Op::LoadSelf);
                self.expr(arg);
                self.emit(Op::PutField(i.to_string()));
            }
            return self.emit(Op::LoadSelf);
        }

        for arg in &call.args {
            self.expr(arg);
        }
        let name = func
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .unwrap_or_else(|| "call".to_string());
        self.invoke(&name, call.args.len());
    }

    /// Lowers an assignment whose value is produced by `value`. Pushes unit.
    fn assign(&mut self, target: &Expr, value: impl FnOnce(&mut Self)) {
        match strip(target) {
            Expr::Path(path) if path.qself.is_none() && path.path.get_ident().is_some() => {
                let name = path.path.segments[0].ident.to_string();
                value(self);
                match self.locals.get(&name).copied().flatten() {
                    Some(slot) => self.emit(Op::StoreLocal(slot)),
                    None => {
                        let slot = self.fresh_slot();
                        self.emit(Op::StoreLocal(slot));
                        self.locals.insert(name, Some(slot));
                    }
                }
            }
            Expr::Field(field) => {
                self.expr(&field.base);
                value(self);
                self.emit(Op::PutField(member_name(&field.member)));
            }
            _ => {
                value(self);
                self.emit(Op::Pop);
            }
        }
        self.emit(Op::LoadConst);
    }

    fn control_flow(&mut self, expr: &Expr) {
        match expr {
            Expr::If(branch) => {
                let saved = self.locals.clone();
                self.expr(&branch.cond);
                self.emit(Op::Pop);
                self.emit(Op::Branch);
                self.block(&branch.then_branch);
                self.emit(Op::Pop);
                self.emit(Op::Label);
                self.locals = saved;
                if let Some((_, otherwise)) = &branch.else_branch {
                    self.expr(otherwise);
                    self.emit(Op::Pop);
                    self.emit(Op::Label);
                }
            }
            Expr::Match(m) => {
                self.expr(&m.expr);
                self.emit(Op::Pop);
                self.emit(Op::Branch);
                for arm in &m.arms {
                    let saved = self.locals.clone();
                    self.bind_unknown(&arm.pat);
                    if let Some((_, guard)) = &arm.guard {
                        self.expr(guard);
                        self.emit(Op::Pop);
                    }
                    self.expr(&arm.body);
                    self.emit(Op::Pop);
                    self.emit(Op::Label);
                    self.locals = saved;
                }
            }
            Expr::While(looped) => {
                let saved = self.locals.clone();
                self.emit(Op::Label);
                self.expr(&looped.cond);
                self.emit(Op::Pop);
                self.emit(Op::Branch);
                self.block(&looped.body);
                self.emit(Op::Pop);
                self.emit(Op::Branch);
                self.emit(Op::Label);
                self.locals = saved;
            }
            Expr::ForLoop(looped) => {
                let saved = self.locals.clone();
                self.expr(&looped.expr);
                self.emit(Op::Pop);
                self.emit(Op::Label);
                self.emit(Op::Branch);
                self.bind_unknown(&looped.pat);
                self.block(&looped.body);
                self.emit(Op::Pop);
                self.emit(Op::Branch);
                self.emit(Op::Label);
                self.locals = saved;
            }
            Expr::Loop(looped) => {
                self.emit(Op::Label);
                self.block(&looped.body);
                self.emit(Op::Pop);
                self.emit(Op::Branch);
                self.emit(Op::Label);
            }
            Expr::Try(tried) => {
                self.expr(&tried.expr);
                self.emit(Op::Pop);
                self.emit(Op::Branch);
                self.emit(Op::Label);
            }
            Expr::Return(ret) => {
                match &ret.expr {
                    Some(value) => self.expr(value),
                    None => self.emit(Op::LoadConst),
                }
                self.emit(Op::Return);
                self.emit(Op::Label);
            }
            Expr::Break(brk) => {
                if let Some(value) = &brk.expr {
                    self.expr(value);
                    self.emit(Op::Pop);
                }
                self.emit(Op::Branch);
                self.emit(Op::Label);
            }
            Expr::Continue(_) => {
                self.emit(Op::Branch);
                self.emit(Op::Label);
            }
            Expr::Let(binding) => {
                // Only reachable as an `if` / `while` condition; bindings stay in scope
                // for the guarded block.
                self.expr(&binding.expr);
                self.emit(Op::Pop);
                self.bind_unknown(&binding.pat);
            }
            _ => {}
        }
        // Whatever value the construct yields is unknown after the block boundary.
        self.emit(Op::Opaque);
    }
}

/// Collects every identifier bound by a pattern.
#[derive(Default)]
struct Bindings(Vec<String>);

impl<'ast> Visit<'ast> for Bindings {
    fn visit_pat_ident(&mut self, pat: &'ast syn::PatIdent) {
        self.0.push(pat.ident.to_string());
        syn::visit::visit_pat_ident(self, pat);
    }
}

/// The name bound by `x` or `x: T`, if the pattern is that simple.
fn simple_binding(pat: &Pat) -> Option<String> {
    match pat {
        Pat::Ident(pat) if pat.subpat.is_none() && pat.by_ref.is_none() => {
            Some(pat.ident.to_string())
        }
        Pat::Type(typed) => simple_binding(&typed.pat),
        _ => None,
    }
}

fn strip(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(p) => strip(&p.expr),
        Expr::Group(g) => strip(&g.expr),
        Expr::Unary(u) if matches!(u.op, UnOp::Deref(_)) => strip(&u.expr),
        other => other,
    }
}

fn member_name(member: &Member) -> String {
    match member {
        Member::Named(ident) => ident.to_string(),
        Member::Unnamed(index) => index.index.to_string(),
    }
}

/// Maps a binary operator to its IR name and whether it is a compound assignment.
fn binary_op(op: &BinOp) -> Option<(&'static str, bool)> {
    let mapped = match op {
        BinOp::Add(_) => ("Add", false),
        BinOp::Sub(_) => ("Sub", false),
        BinOp::Mul(_) => ("Mul", false),
        BinOp::Div(_) => ("Div", false),
        BinOp::Rem(_) => ("Rem", false),
        BinOp::And(_) => ("And", false),
        BinOp::Or(_) => ("Or", false),
        BinOp::BitXor(_) => ("BitXor", false),
        BinOp::BitAnd(_) => ("BitAnd", false),
        BinOp::BitOr(_) => ("BitOr", false),
        BinOp::Shl(_) => ("Shl", false),
        BinOp::Shr(_) => ("Shr", false),
        BinOp::Eq(_) => ("Eq", false),
        BinOp::Lt(_) => ("Lt", false),
        BinOp::Le(_) => ("Le", false),
        BinOp::Ne(_) => ("Ne", false),
        BinOp::Ge(_) => ("Ge", false),
        BinOp::Gt(_) => ("Gt", false),
        BinOp::AddAssign(_) => ("Add", true),
        BinOp::SubAssign(_) => ("Sub", true),
        BinOp::MulAssign(_) => ("Mul", true),
        BinOp::DivAssign(_) => ("Div", true),
        BinOp::RemAssign(_) => ("Rem", true),
        BinOp::BitXorAssign(_) => ("BitXor", true),
        BinOp::BitAndAssign(_) => ("BitAnd", true),
        BinOp::BitOrAssign(_) => ("BitOr", true),
        BinOp::ShlAssign(_) => ("Shl", true),
        BinOp::ShrAssign(_) => ("Shr", true),
        _ => return None,
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::{ImplItemFn, parse_quote};

    fn lower_ctor(item: ImplItemFn) -> Vec<Op> {
        lower_constructor(&item.sig, &item.block, "Point")
    }

    fn lower_accessor(item: ImplItemFn) -> Vec<Op> {
        lower_method(&item.sig, &item.block, "Point")
    }

    #[test]
    fn struct_literal_with_shorthand() {
        let ops = lower_ctor(parse_quote! {
            fn new(x: i32, y: i32) -> Self { Self { x, y: y * 2 } }
        });
        assert_eq!(
            ops,
            vec![
                Op::LoadSelf,
                Op::LoadParam(0),
                Op::PutField("x".into()),
                Op::LoadSelf,
                Op::LoadParam(1),
                Op::LoadConst,
                Op::Binary("Mul"),
                Op::PutField("y".into()),
                Op::LoadSelf,
                Op::Return,
            ]
        );
    }

    #[test]
    fn locals_get_slots_and_scopes_are_restored() {
        let ops = lower_ctor(parse_quote! {
            fn new(x: i32) -> Point {
                let scaled = x * K;
                { let x = 3; }
                Point { x: scaled / K }
            }
        });
        assert_eq!(
            ops,
            vec![
                Op::LoadParam(0),
                Op::LoadConst,
                Op::Binary("Mul"),
                Op::StoreLocal(0),
                Op::LoadConst,
                Op::StoreLocal(1),
                Op::LoadConst,
                Op::Pop,
                Op::LoadSelf,
                Op::LoadLocal(0),
                Op::LoadConst,
                Op::Binary("Div"),
                Op::PutField("x".into()),
                Op::LoadSelf,
                Op::Return,
            ]
        );
    }

    #[test]
    fn mutable_parameters_live_in_slots() {
        let ops = lower_ctor(parse_quote! {
            fn new(mut x: i32) -> Self { x += 1; Self(x) }
        });
        assert_eq!(
            &ops[..6],
            &[
                Op::LoadParam(0),
                Op::StoreLocal(0),
                Op::LoadLocal(0),
                Op::LoadConst,
                Op::Binary("Add"),
                Op::StoreLocal(0),
            ]
        );
        assert!(ops.contains(&Op::PutField("0".into())));
    }

    #[test]
    fn control_flow_ends_blocks() {
        let ops = lower_ctor(parse_quote! {
            fn new(x: i32) -> Self {
                if x < 0 { panic!() }
                Self { x }
            }
        });
        assert!(ops.contains(&Op::Branch));
        assert!(ops.contains(&Op::Label));
        assert_eq!(ops.last(), Some(&Op::Return));
    }

    #[test]
    fn mutating_receivers_are_forgotten() {
        let ops = lower_ctor(parse_quote! {
            fn new(mut name: String) -> Self { name.push('!'); Self { name } }
        });
        assert_eq!(
            ops,
            vec![
                Op::LoadParam(0),
                Op::StoreLocal(0),
                Op::LoadLocal(0),
                Op::LoadConst,
                Op::Invoke {
                    name: "push".into(),
                    argc: 2
                },
                Op::Opaque,
                Op::StoreLocal(0),
                Op::Pop,
                Op::LoadSelf,
                Op::LoadLocal(0),
                Op::PutField("name".into()),
                Op::LoadSelf,
                Op::Return,
            ]
        );
    }

    #[test]
    fn mutable_borrows_are_forgotten() {
        let ops = lower_ctor(parse_quote! {
            fn new(a: i32, mut b: i32) -> Self { reset(&mut b); Self { a, b } }
        });
        assert_eq!(
            ops,
            vec![
                Op::LoadParam(1),
                Op::StoreLocal(0),
                Op::LoadLocal(0),
                Op::Opaque,
                Op::StoreLocal(0),
                Op::Invoke {
                    name: "reset".into(),
                    argc: 1
                },
                Op::Pop,
                Op::LoadSelf,
                Op::LoadParam(0),
                Op::PutField("a".into()),
                Op::LoadSelf,
                Op::LoadLocal(0),
                Op::PutField("b".into()),
                Op::LoadSelf,
                Op::Return,
            ]
        );
    }

    #[test]
    fn changed_parameters_move_into_a_slot() {
        // Interior mutability changes a parameter that is not declared `mut`.
        let ops = lower_ctor(parse_quote! {
            fn new(cell: Cell<i32>) -> Self {
                { cell.set(0); }
                Self { cell }
            }
        });
        assert_eq!(&ops[3..5], &[Op::Opaque, Op::StoreLocal(0)]);
        assert_eq!(
            &ops[ops.len() - 5..],
            &[
                Op::LoadSelf,
                Op::LoadLocal(0),
                Op::PutField("cell".into()),
                Op::LoadSelf,
                Op::Return,
            ]
        );
    }

    #[test]
    fn non_mutating_calls_keep_the_receiver() {
        let ops = lower_ctor(parse_quote! {
            fn new(name: String) -> Self { Self { name: name.clone() } }
        });
        assert!(!ops.contains(&Op::Opaque));
        assert!(ops.contains(&Op::LoadParam(0)));
    }

    #[test]
    fn mutated_fields_are_stored_again() {
        let ops = lower_ctor(parse_quote! {
            fn new(name: String) -> Self {
                let mut value = Self { name };
                value.name.push('!');
                value
            }
        });
        let stores = ops
            .iter()
            .filter(|op| **op == Op::PutField("name".into()))
            .count();
        assert_eq!(stores, 2);
    }

    #[test]
    fn macro_statements_end_the_block() {
        let ops = lower_ctor(parse_quote! {
            fn new(a: i32, b: i32) -> Self {
                let mut t = b;
                zero!(t);
                Self { a, b: t }
            }
        });
        assert_eq!(
            &ops[..4],
            &[Op::LoadParam(1), Op::StoreLocal(0), Op::Branch, Op::Label]
        );
    }

    #[test]
    fn macro_expressions_are_opaque() {
        let ops = lower_ctor(parse_quote! {
            fn new(x: i32) -> Self { Self { x: same!(x) } }
        });
        assert_eq!(
            ops,
            vec![
                Op::LoadSelf,
                Op::Branch,
                Op::Label,
                Op::Opaque,
                Op::PutField("x".into()),
                Op::LoadSelf,
                Op::Return,
            ]
        );
    }

    #[test]
    fn accessor_receivers_are_left_alone() {
        let ops = lower_accessor(parse_quote! {
            fn label(&self) -> String { self.name.to_string() }
        });
        assert_eq!(
            ops,
            vec![
                Op::LoadSelf,
                Op::GetField("name".into()),
                Op::Invoke {
                    name: "to_string".into(),
                    argc: 1
                },
                Op::Return,
            ]
        );
    }

    #[test]
    fn accessors_lower_to_a_field_read() {
        let ops = lower_accessor(parse_quote! {
            fn name(&self) -> &str { self.name.as_str() }
        });
        assert_eq!(
            ops,
            vec![
                Op::LoadSelf,
                Op::GetField("name".into()),
                Op::Invoke {
                    name: "as_str".into(),
                    argc: 1
                },
                Op::Return,
            ]
        );
    }
}
