/// Tree-walking transpiler from the Puppy parse tree to generator-function
/// source text.
///
/// `conv` is the single entry point: statement nodes append complete
/// indented lines to `out`, expression nodes append inline text and return
/// their inferred type. Recording an error cancels the enclosing top-level
/// statement (`Cancel` propagates up to the statement-sequencing loop, which
/// discards the partial output and moves to the next statement); warnings
/// and notices never cancel anything.
use std::collections::HashMap;

use crate::env::{Cancel, Env, FuncContext};
use crate::symbols::{self, PackageEntry, Symbol};
use crate::tree::{ParseTree, Tag};
use crate::types::Type;

pub fn conv(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    match t.tag {
        Tag::Source | Tag::Block => {
            conv_statements(env, t.subs(), out);
            Ok(Type::Void)
        }
        Tag::If => conv_if(env, t, out),
        Tag::While => conv_while(env, t, out),
        Tag::For => conv_for(env, t, out),
        Tag::FuncDecl => conv_func_decl(env, t, out),
        Tag::Return => conv_return(env, t, out),
        Tag::Break | Tag::Continue => {
            if !env.in_loop() {
                env.pwarn(t, "OnlyInLoop", vec![t.tokenize().to_string()]);
                return Ok(Type::Void);
            }
            out.push_str(&format!("{}{};\n", env.indent(), t.tokenize()));
            Ok(Type::Void)
        }
        Tag::Pass => Ok(Type::Void),
        Tag::Import => conv_import(env, t),
        Tag::Assign => conv_assign(env, t, out),
        Tag::SelfAssign => conv_self_assign(env, t, out),
        Tag::ExprStmt => {
            let expr = child(env, t, "expr")?;
            let mut code = String::new();
            conv(env, expr, &mut code)?;
            out.push_str(&format!("{}{};\n", env.indent(), code));
            Ok(Type::Void)
        }
        // recovery marker: the parser already reported the syntax error
        Tag::Err => Ok(Type::Void),

        Tag::Or | Tag::And => {
            let l = child(env, t, "left")?;
            let r = child(env, t, "right")?;
            let mut lc = String::new();
            conv(env, l, &mut lc)?;
            let mut rc = String::new();
            conv(env, r, &mut rc)?;
            let op = if t.tag == Tag::Or { "||" } else { "&&" };
            out.push_str(&format!("({} {} {})", lc, op, rc));
            Ok(Type::Bool)
        }
        Tag::Not => {
            let e = child(env, t, "expr")?;
            let mut c = String::new();
            conv(env, e, &mut c)?;
            out.push_str(&format!("!({})", c));
            Ok(Type::Bool)
        }
        Tag::Infix => {
            let l = child(env, t, "left")?;
            let r = child(env, t, "right")?;
            let mut lc = String::new();
            let lty = conv(env, l, &mut lc)?;
            let mut rc = String::new();
            let rty = conv(env, r, &mut rc)?;
            let (code, ty) = infix_code(env, l, r, t.tokenize(), &lc, &lty, &rc, &rty)?;
            out.push_str(&code);
            Ok(ty)
        }
        Tag::Unary => {
            let e = child(env, t, "expr")?;
            let mut c = String::new();
            let ty = conv(env, e, &mut c)?;
            if !Type::Number.accept(&ty, &mut env.pool, true) {
                let off = env.pool.resolved(&ty).display(&env.pool);
                return Err(env.perror(e, "TypeError", vec!["number".to_string(), off]));
            }
            out.push_str(&format!("-({})", c));
            Ok(Type::Number)
        }
        Tag::IfExpr => {
            let cond = child(env, t, "cond")?;
            let then = child(env, t, "then")?;
            let other = child(env, t, "else")?;
            let mut cc = String::new();
            let cty = conv(env, cond, &mut cc)?;
            check_bool(env, cond, &cty)?;
            let mut tc = String::new();
            let tty = conv(env, then, &mut tc)?;
            let mut ec = String::new();
            let ety = conv(env, other, &mut ec)?;
            // the arms must agree on one common type
            if !tty.accept(&ety, &mut env.pool, true) {
                let a = env.pool.resolved(&tty).display(&env.pool);
                let b = env.pool.resolved(&ety).display(&env.pool);
                return Err(env.perror(other, "TypeError", vec![a, b]));
            }
            out.push_str(&format!("({} ? {} : {})", cc, tc, ec));
            Ok(tty)
        }
        Tag::ApplyExpr => conv_apply(env, t, out),
        Tag::MethodExpr => conv_method(env, t, out),
        Tag::GetField => conv_get_field(env, t, out),
        Tag::IndexExpr => conv_index(env, t, out),
        Tag::Slice => conv_slice(env, t, out),
        Tag::ListExpr => {
            let elem = env.pool.new_var();
            let mut codes = Vec::new();
            for s in t.subs() {
                let mut c = String::new();
                let ty = conv(env, s, &mut c)?;
                // every entry unifies with one element type
                if !elem.accept(&ty, &mut env.pool, true) {
                    let exp = env.pool.resolved(&elem).display(&env.pool);
                    let off = env.pool.resolved(&ty).display(&env.pool);
                    return Err(env.perror(s, "TypeError", vec![exp, off]));
                }
                codes.push(c);
            }
            out.push_str(&format!("[{}]", codes.join(", ")));
            Ok(Type::list_of(elem))
        }
        Tag::TupleExpr => conv_tuple(env, t, out),
        Tag::DataExpr => conv_data(env, t, out),
        Tag::FormatStr => {
            let mut parts = Vec::new();
            for seg in t.subs() {
                if let Some(e) = seg.get("expr") {
                    let mut c = String::new();
                    conv(env, e, &mut c)?;
                    parts.push(format!("lib.str({})", c));
                } else {
                    parts.push(quote_js(seg.tokenize()));
                }
            }
            if parts.is_empty() {
                out.push_str("''");
            } else {
                out.push_str(&parts.join(" + "));
            }
            Ok(Type::Str)
        }
        Tag::Name => conv_name(env, t, out),
        Tag::Num => {
            let raw = t.tokenize().to_string();
            let mut norm = String::new();
            let mut zenkaku = false;
            for c in raw.chars() {
                if ('\u{FF10}'..='\u{FF19}').contains(&c) {
                    zenkaku = true;
                    norm.push(char::from(b'0' + (c as u32 - 0xFF10) as u8));
                } else {
                    norm.push(c);
                }
            }
            if zenkaku {
                env.pwarn(t, "Zenkaku", vec![raw, norm.clone()]);
            }
            out.push_str(&norm);
            Ok(Type::Number)
        }
        Tag::Str => {
            out.push_str(t.tokenize());
            Ok(Type::Str)
        }
        Tag::TrueLit => {
            out.push_str("true");
            Ok(Type::Bool)
        }
        Tag::FalseLit => {
            out.push_str("false");
            Ok(Type::Bool)
        }
        Tag::NullLit => {
            out.push_str("null");
            Ok(Type::Any)
        }
        // anything else has no translation; report it and recover with a
        // placeholder value so the rest of the statement still checks
        _ => {
            let _ = env.perror(t, "UndefinedParseTree", vec![format!("{:?}", t.tag)]);
            out.push_str("null");
            Ok(Type::Any)
        }
    }
}

/// Statement sequencing with per-statement isolation: a cancelled statement
/// discards its partial output and the loop continues with the next one.
fn conv_statements(env: &mut Env, stmts: &[ParseTree], out: &mut String) {
    for stmt in stmts {
        let mut buf = String::new();
        env.emit_yield(stmt.row, &mut buf);
        if conv(env, stmt, &mut buf).is_ok() {
            out.push_str(&buf);
        }
    }
}

fn child<'a>(env: &mut Env, t: &'a ParseTree, name: &'static str) -> Result<&'a ParseTree, Cancel> {
    match t.get(name) {
        Some(sub) => Ok(sub),
        None => Err(env.perror(t, "UndefinedParseTree", vec![name.to_string()])),
    }
}

fn check_bool(env: &mut Env, cond: &ParseTree, ty: &Type) -> Result<(), Cancel> {
    if !Type::Bool.accept(ty, &mut env.pool, true) {
        let off = env.pool.resolved(ty).display(&env.pool);
        return Err(env.perror(cond, "TypeError", vec!["bool".to_string(), off]));
    }
    Ok(())
}

fn quote_js(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

fn conv_if(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let cond = child(env, t, "cond")?;
    let then = child(env, t, "then")?;
    let mut cc = String::new();
    let cty = conv(env, cond, &mut cc)?;
    check_bool(env, cond, &cty)?;

    let indent = env.indent();
    out.push_str(&format!("{}if ({}) {{\n", indent, cc));
    env.enter_block(false);
    conv_statements(env, then.subs(), out);
    env.exit();

    if let Some(els) = t.get("else") {
        out.push_str(&format!("{}}} else {{\n", indent));
        env.enter_block(false);
        if els.tag == Tag::Block {
            conv_statements(env, els.subs(), out);
        } else {
            // elif chain: a nested if statement in the else branch
            let mut buf = String::new();
            if conv(env, els, &mut buf).is_ok() {
                out.push_str(&buf);
            }
        }
        env.exit();
    }
    out.push_str(&format!("{}}}\n", indent));
    Ok(Type::Void)
}

fn conv_while(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let cond = child(env, t, "cond")?;
    let body = child(env, t, "body")?;
    let mut cc = String::new();
    let cty = conv(env, cond, &mut cc)?;
    check_bool(env, cond, &cty)?;

    let id = env.new_id();
    let indent = env.indent();
    out.push_str(&format!("{}var _sync{} = 0;\n", indent, id));
    out.push_str(&format!("{}while ({}) {{\n", indent, cc));
    env.enter_block(true);
    conv_statements(env, body.subs(), out);
    // cooperative suspension so a hot loop cannot starve the host
    out.push_str(&format!(
        "{}if (++_sync{} % 16 === 0) {{ yield {}; }}\n",
        env.indent(),
        id,
        t.row * 1000
    ));
    env.exit();
    out.push_str(&format!("{}}}\n", indent));

    if let Some(ctx) = env.func_mut() {
        ctx.is_sync = true;
    }
    Ok(Type::Void)
}

fn conv_for(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let each = child(env, t, "each")?;
    let list = child(env, t, "list")?;
    let body = child(env, t, "body")?;

    let mut lc = String::new();
    let lty = conv(env, list, &mut lc)?;
    let elem = env.pool.new_var();
    if !Type::list_of(elem.clone()).accept(&lty, &mut env.pool, true) {
        if env.pool.real_type(&lty) == Type::Str {
            let _ = elem.accept(&Type::Str, &mut env.pool, true);
        } else {
            let shown = env.pool.resolved(&lty).display(&env.pool);
            return Err(env.perror(list, "TypeError", vec!["list[any]".to_string(), shown]));
        }
    }

    let indent = env.indent();
    env.enter_block(true);
    let sym = env.decl_var(each.tokenize(), elem);
    out.push_str(&format!("{}for (var {} of {}) {{\n", indent, sym.code, lc));
    conv_statements(env, body.subs(), out);
    env.exit();
    out.push_str(&format!("{}}}\n", indent));
    Ok(Type::Void)
}

fn annotation_type(env: &mut Env, t: &ParseTree) -> Type {
    match t.tokenize() {
        "number" | "int" | "float" => Type::Number,
        "str" | "string" => Type::Str,
        "bool" => Type::Bool,
        "list" => Type::list_of(Type::Any),
        "matter" => Type::Matter,
        "vec2" => Type::Vec2,
        "color" => Type::Color,
        "any" => Type::Any,
        _ => env.pool.new_var(),
    }
}

fn conv_func_decl(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let name_node = child(env, t, "name")?;
    let params_node = child(env, t, "params")?;
    let body_node = child(env, t, "body")?;
    let fname = name_node.tokenize().to_string();

    let mut pnames = Vec::new();
    let mut ptypes = Vec::new();
    for p in params_node.subs() {
        pnames.push(p.tokenize().to_string());
        let ty = match p.get("type") {
            Some(a) => annotation_type(env, a),
            None => env.pool.new_var(),
        };
        ptypes.push(ty);
    }
    let ret = match t.get("rettype") {
        Some(a) => annotation_type(env, a),
        None => env.pool.new_var(),
    };

    // declared before the body so recursive calls resolve
    let fsym = env.decl_var(&fname, Type::func(ret.clone(), ptypes.clone()));

    let indent = env.indent();
    env.enter_func(FuncContext {
        name: fname.clone(),
        ret: ret.clone(),
        has_return: false,
        is_sync: false,
    });
    let mut codes = Vec::new();
    for (pname, pty) in pnames.iter().zip(ptypes.iter()) {
        let psym = env.decl_var(pname, pty.clone());
        codes.push(psym.code);
    }
    let mut body = String::new();
    conv_statements(env, body_node.subs(), &mut body);
    let ctx = env.exit().unwrap_or(FuncContext {
        name: fname.clone(),
        ret: ret.clone(),
        has_return: false,
        is_sync: false,
    });

    // no return fired anywhere in the body, so the declared return type
    // must accept void
    if !ctx.has_return && !ret.accept(&Type::Void, &mut env.pool, true) {
        let shown = env.pool.resolved(&ret).display(&env.pool);
        return Err(env.perror(t, "TypeError", vec![shown, "void".to_string()]));
    }

    let keyword = if ctx.is_sync {
        env.set_sync(&fname);
        "function*"
    } else {
        "function"
    };
    let prefix = if fsym.is_global() { "" } else { "var " };
    out.push_str(&format!(
        "{}{}{} = {} ({}) {{\n{}{}}};\n",
        indent,
        prefix,
        fsym.code,
        keyword,
        codes.join(", "),
        body,
        indent
    ));
    Ok(Type::Void)
}

fn conv_return(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let ret = match env.func_mut() {
        Some(ctx) => {
            ctx.has_return = true;
            ctx.ret.clone()
        }
        None => {
            env.pwarn(t, "OnlyInFunction", vec!["return".to_string()]);
            return Ok(Type::Void);
        }
    };
    match t.get("expr") {
        Some(e) => {
            let mut code = String::new();
            let ty = conv(env, e, &mut code)?;
            if !ret.accept(&ty, &mut env.pool, true) {
                let exp = env.pool.resolved(&ret).display(&env.pool);
                let off = env.pool.resolved(&ty).display(&env.pool);
                return Err(env.perror(e, "TypeError", vec![exp, off]));
            }
            out.push_str(&format!("{}return {};\n", env.indent(), code));
        }
        None => {
            let _ = ret.accept(&Type::Void, &mut env.pool, true);
            out.push_str(&format!("{}return;\n", env.indent()));
        }
    }
    Ok(Type::Void)
}

fn conv_import(env: &mut Env, t: &ParseTree) -> Result<Type, Cancel> {
    let name_node = child(env, t, "name")?;
    let pkg_name = name_node.tokenize().to_string();
    match symbols::package(&pkg_name) {
        Some(pkg) => {
            env.install_package(pkg);
            let alias = t
                .get("alias")
                .map(|a| a.tokenize().to_string())
                .unwrap_or_else(|| pkg_name.clone());
            env.set_import(&alias, &pkg_name);
            env.define(&alias, Symbol::new(alias.clone(), Type::Module(pkg_name)));
            Ok(Type::Void)
        }
        None => Err(env.perror(name_node, "UnknownPackageName", vec![pkg_name])),
    }
}

fn conv_assign(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let left = child(env, t, "left")?;
    let right = child(env, t, "right")?;
    let mut rcode = String::new();
    let rty = conv(env, right, &mut rcode)?;

    match left.tag {
        Tag::Name => {
            let name = left.tokenize().to_string();
            match env.get_symbol_scoped(&name) {
                Some(sym) => {
                    if !sym.mutable {
                        return Err(env.perror(left, "Immutable", vec![name]));
                    }
                    if !sym.ty.accept(&rty, &mut env.pool, true) {
                        let exp = env.pool.resolved(&sym.ty).display(&env.pool);
                        let off = env.pool.resolved(&rty).display(&env.pool);
                        return Err(env.perror(right, "TypeError", vec![exp, off]));
                    }
                    out.push_str(&format!("{}{} = {};\n", env.indent(), sym.code, rcode));
                }
                None => {
                    let is_matter = env.pool.real_type(&rty) == Type::Matter;
                    let sym = env.decl_var(&name, rty);
                    if is_matter {
                        env.mark_matter(&name);
                    }
                    let prefix = if sym.is_global() { "" } else { "var " };
                    out.push_str(&format!(
                        "{}{}{} = {};\n",
                        env.indent(),
                        prefix,
                        sym.code,
                        rcode
                    ));
                }
            }
        }
        Tag::GetField => {
            let recv = child(env, left, "recv")?;
            let fname_node = child(env, left, "name")?;
            let fname = fname_node.tokenize().to_string();
            let mut rcv = String::new();
            let recv_ty = conv(env, recv, &mut rcv)?;
            if matches!(env.pool.real_type(&recv_ty), Type::Module(_)) {
                return Err(env.perror(fname_node, "Immutable", vec![fname]));
            }
            let acc = env.field_accessor(&fname);
            if !acc.ty.accept(&rty, &mut env.pool, true) {
                let exp = env.pool.resolved(&acc.ty).display(&env.pool);
                let off = env.pool.resolved(&rty).display(&env.pool);
                return Err(env.perror(right, "TypeError", vec![exp, off]));
            }
            let code = acc.setter.replace("{0}", &rcv).replace("{1}", &rcode);
            out.push_str(&format!("{}{};\n", env.indent(), code));
        }
        Tag::IndexExpr => {
            let recv = child(env, left, "recv")?;
            let index = child(env, left, "index")?;
            let mut rcv = String::new();
            conv(env, recv, &mut rcv)?;
            let mut idx = String::new();
            conv(env, index, &mut idx)?;
            let tid = env.token_id(left);
            out.push_str(&format!(
                "{}lib.setindex({}, {}, {}, codemap[{}]);\n",
                env.indent(),
                rcv,
                idx,
                rcode,
                tid
            ));
        }
        _ => return Err(env.perror(left, "BadAssignment", vec![])),
    }
    Ok(Type::Void)
}

fn conv_self_assign(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let left = child(env, t, "left")?;
    let right = child(env, t, "right")?;
    let op = t.tokenize().to_string();
    let mut rcode = String::new();
    let rty = conv(env, right, &mut rcode)?;

    match left.tag {
        Tag::Name => {
            let name = left.tokenize().to_string();
            let sym = match env.get_symbol(&name) {
                Some(s) => s,
                None => return Err(env.perror(left, "UndefinedName", vec![name])),
            };
            if !sym.mutable {
                return Err(env.perror(left, "Immutable", vec![name]));
            }
            let (value, vty) =
                infix_code(env, left, right, &op, &sym.code, &sym.ty, &rcode, &rty)?;
            if !sym.ty.accept(&vty, &mut env.pool, true) {
                let exp = env.pool.resolved(&sym.ty).display(&env.pool);
                let off = env.pool.resolved(&vty).display(&env.pool);
                return Err(env.perror(right, "TypeError", vec![exp, off]));
            }
            out.push_str(&format!("{}{} = {};\n", env.indent(), sym.code, value));
        }
        Tag::GetField => {
            let recv = child(env, left, "recv")?;
            let fname_node = child(env, left, "name")?;
            let fname = fname_node.tokenize().to_string();
            let mut rcv = String::new();
            conv(env, recv, &mut rcv)?;
            let acc = env.field_accessor(&fname);
            let getter = acc.getter.replace("{0}", &rcv);
            let (value, vty) =
                infix_code(env, left, right, &op, &getter, &acc.ty, &rcode, &rty)?;
            if !acc.ty.accept(&vty, &mut env.pool, true) {
                let exp = env.pool.resolved(&acc.ty).display(&env.pool);
                let off = env.pool.resolved(&vty).display(&env.pool);
                return Err(env.perror(right, "TypeError", vec![exp, off]));
            }
            let code = acc.setter.replace("{0}", &rcv).replace("{1}", &value);
            out.push_str(&format!("{}{};\n", env.indent(), code));
        }
        Tag::IndexExpr => {
            let recv = child(env, left, "recv")?;
            let index = child(env, left, "index")?;
            let mut rcv = String::new();
            conv(env, recv, &mut rcv)?;
            let mut idx = String::new();
            conv(env, index, &mut idx)?;
            let tid = env.token_id(left);
            let getter = format!("lib.index({}, {}, codemap[{}])", rcv, idx, tid);
            let (value, _) =
                infix_code(env, left, right, &op, &getter, &Type::Any, &rcode, &rty)?;
            out.push_str(&format!(
                "{}lib.setindex({}, {}, {}, codemap[{}]);\n",
                env.indent(),
                rcv,
                idx,
                value,
                tid
            ));
        }
        _ => return Err(env.perror(left, "BadAssignment", vec![])),
    }
    Ok(Type::Void)
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn conv_name(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let name = t.tokenize().to_string();
    if let Some(sym) = env.get_symbol(&name) {
        out.push_str(&sym.code);
        return Ok(sym.ty);
    }
    if let Some(pkg) = symbols::package_of(&name) {
        if env.auto_import(pkg) {
            env.pinfo(t, "InferredPackage", vec![pkg.to_string()]);
            if let Some(sym) = env.get_symbol(&name) {
                out.push_str(&sym.code);
                return Ok(sym.ty);
            }
        }
    }
    Err(env.perror(t, "UndefinedName", vec![name]))
}

fn is_dynamic(t: &Type) -> bool {
    matches!(t, Type::Any | Type::Var(_))
}

/// Binary operator lowering shared by infix expressions and the augmented
/// assignment desugaring. `lnode`/`rnode` anchor the diagnostics: an
/// unusable left operand is a plain `TypeError`, a right operand that does
/// not fit the left one is a `BinaryTypeError`.
#[allow(clippy::too_many_arguments)]
fn infix_code(
    env: &mut Env,
    lnode: &ParseTree,
    rnode: &ParseTree,
    op: &str,
    lc: &str,
    lty: &Type,
    rc: &str,
    rty: &Type,
) -> Result<(String, Type), Cancel> {
    let a = env.pool.real_type(lty);
    let b = env.pool.real_type(rty);

    match op {
        "==" => Ok((format!("({} === {})", lc, rc), Type::Bool)),
        "!=" => Ok((format!("({} !== {})", lc, rc), Type::Bool)),
        "<" | "<=" | ">" | ">=" => {
            if !a.accept(&b, &mut env.pool, true) && !b.accept(&a, &mut env.pool, true) {
                let ad = a.display(&env.pool);
                let bd = b.display(&env.pool);
                return Err(env.perror(
                    rnode,
                    "BinaryTypeError",
                    vec![op.to_string(), ad, bd],
                ));
            }
            Ok((format!("({} {} {})", lc, op, rc), Type::Bool))
        }
        "+" => match (&a, &b) {
            (Type::Number, Type::Number) => {
                Ok((format!("({} + {})", lc, rc), Type::Number))
            }
            (Type::Str, Type::Str) => Ok((format!("({} + {})", lc, rc), Type::Str)),
            (Type::List(_), Type::List(_)) => {
                Ok((format!("({}).concat({})", lc, rc), a.clone()))
            }
            (Type::Vec2, Type::Vec2) => {
                Ok((format!("lib.anyAdd({}, {})", lc, rc), Type::Vec2))
            }
            (Type::Number, Type::Var(_)) | (Type::Var(_), Type::Number) => {
                let _ = Type::Number.accept(&a, &mut env.pool, true);
                let _ = Type::Number.accept(&b, &mut env.pool, true);
                Ok((format!("({} + {})", lc, rc), Type::Number))
            }
            (Type::Str, Type::Var(_)) | (Type::Var(_), Type::Str) => {
                let _ = Type::Str.accept(&a, &mut env.pool, true);
                let _ = Type::Str.accept(&b, &mut env.pool, true);
                Ok((format!("({} + {})", lc, rc), Type::Str))
            }
            _ if is_dynamic(&a) || is_dynamic(&b) => {
                Ok((format!("lib.anyAdd({}, {})", lc, rc), Type::Any))
            }
            (Type::Number, _) | (Type::Str, _) | (Type::List(_), _) => {
                let ad = a.display(&env.pool);
                let bd = b.display(&env.pool);
                Err(env.perror(rnode, "BinaryTypeError", vec![op.to_string(), ad, bd]))
            }
            _ => {
                let ad = a.display(&env.pool);
                Err(env.perror(lnode, "TypeError", vec!["number".to_string(), ad]))
            }
        },
        "*" => match (&a, &b) {
            (Type::Number, Type::Number) => {
                Ok((format!("({} * {})", lc, rc), Type::Number))
            }
            (Type::Str, Type::Number) => {
                Ok((format!("lib.anyMul({}, {})", lc, rc), Type::Str))
            }
            (Type::List(_), Type::Number) => {
                Ok((format!("lib.anyMul({}, {})", lc, rc), a.clone()))
            }
            (Type::Vec2, Type::Number) => {
                Ok((format!("lib.anyMul({}, {})", lc, rc), Type::Vec2))
            }
            (Type::Number, Type::Var(_)) | (Type::Var(_), Type::Number) => {
                let _ = Type::Number.accept(&a, &mut env.pool, true);
                let _ = Type::Number.accept(&b, &mut env.pool, true);
                Ok((format!("({} * {})", lc, rc), Type::Number))
            }
            _ if is_dynamic(&a) || is_dynamic(&b) => {
                Ok((format!("lib.anyMul({}, {})", lc, rc), Type::Any))
            }
            (Type::Number, _) | (Type::Str, _) | (Type::List(_), _) => {
                let ad = a.display(&env.pool);
                let bd = b.display(&env.pool);
                Err(env.perror(rnode, "BinaryTypeError", vec![op.to_string(), ad, bd]))
            }
            _ => {
                let ad = a.display(&env.pool);
                Err(env.perror(lnode, "TypeError", vec!["number".to_string(), ad]))
            }
        },
        "-" | "%" | "/" | "//" | "**" => {
            if !Type::Number.accept(&a, &mut env.pool, true) {
                let ad = a.display(&env.pool);
                return Err(env.perror(lnode, "TypeError", vec!["number".to_string(), ad]));
            }
            if !Type::Number.accept(&b, &mut env.pool, true) {
                let ad = a.display(&env.pool);
                let bd = b.display(&env.pool);
                return Err(env.perror(
                    rnode,
                    "BinaryTypeError",
                    vec![op.to_string(), ad, bd],
                ));
            }
            let code = match op {
                "//" => format!("(({} / {}) | 0)", lc, rc),
                "**" => format!("Math.pow({}, {})", lc, rc),
                _ => format!("({} {} {})", lc, op, rc),
            };
            Ok((code, Type::Number))
        }
        _ => Err(env.perror(lnode, "UndefinedParseTree", vec![op.to_string()])),
    }
}

fn lookup_callable(env: &Env, name: &str, arity: usize) -> Option<Symbol> {
    env.get_symbol(&format!("{}@{}", name, arity))
        .or_else(|| env.get_symbol(name))
}

/// Convert and type-check call arguments against the parameter list.
/// Trailing keyword-record parameters are optional; surplus arguments warn
/// but stay in the emitted call so their effects are not lost.
fn convert_args(
    env: &mut Env,
    fname: &str,
    call: &ParseTree,
    args: &[ParseTree],
    params: &[Type],
) -> Result<Vec<String>, Cancel> {
    let required = params
        .iter()
        .filter(|p| !matches!(p, Type::Option))
        .count();
    let positional = args.iter().filter(|a| a.tag != Tag::DataExpr).count();
    if positional < required {
        return Err(env.perror(
            call,
            "MissingArguments",
            vec![fname.to_string(), required.to_string()],
        ));
    }
    if args.len() > params.len() {
        env.pwarn(call, "TooManyArguments", vec![fname.to_string()]);
    }

    let mut codes = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        let mut code = String::new();
        let ty = conv(env, arg, &mut code)?;
        if let Some(expected) = params.get(i).cloned() {
            if !expected.accept(&ty, &mut env.pool, true) {
                let exp = env.pool.resolved(&expected).display(&env.pool);
                let off = env.pool.resolved(&ty).display(&env.pool);
                return Err(env.perror(arg, "TypeError", vec![exp, off]));
            }
        }
        codes.push(code);
    }
    Ok(codes)
}

fn instantiate(env: &mut Env, ty: &Type) -> Type {
    if ty.has_alpha() {
        let mut map = HashMap::new();
        ty.to_var_type(&mut map, &mut env.pool)
    } else {
        ty.clone()
    }
}

fn conv_apply(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let name_node = child(env, t, "name")?;
    let args_node = child(env, t, "args")?;

    // computed callee, e.g. the result of another call
    if name_node.tag != Tag::Name {
        let mut fcode = String::new();
        conv(env, name_node, &mut fcode)?;
        let mut codes = Vec::new();
        for a in args_node.subs() {
            let mut c = String::new();
            conv(env, a, &mut c)?;
            codes.push(c);
        }
        out.push_str(&format!("{}({})", fcode, codes.join(", ")));
        return Ok(Type::Any);
    }

    let fname = name_node.tokenize().to_string();
    if env.is_unsupported(&fname) {
        return Err(env.perror(name_node, "Unsupported", vec![fname]));
    }

    let positional = args_node
        .subs()
        .iter()
        .filter(|a| a.tag != Tag::DataExpr)
        .count();
    let sym = match lookup_callable(env, &fname, positional) {
        Some(s) => s,
        None => {
            let retry = match symbols::package_of(&fname) {
                Some(pkg) if env.auto_import(pkg) => {
                    env.pinfo(name_node, "InferredPackage", vec![pkg.to_string()]);
                    lookup_callable(env, &fname, positional)
                }
                _ => None,
            };
            match retry {
                Some(s) => s,
                None => {
                    return Err(env.perror(name_node, "UndefinedFunction", vec![fname]))
                }
            }
        }
    };

    let fty = instantiate(env, &sym.ty);
    if !matches!(fty, Type::Func(_)) {
        return Err(env.perror(name_node, "UndefinedFunction", vec![fname]));
    }
    let params = fty.params().to_vec();
    let codes = convert_args(env, &fname, t, args_node.subs(), &params)?;

    let call = format!("{}({})", sym.code, codes.join(", "));
    if sym.is_sync {
        if let Some(ctx) = env.func_mut() {
            ctx.is_sync = true;
        }
        out.push_str(&format!("(yield* {})", call));
    } else {
        out.push_str(&call);
    }
    Ok(fty.ret().cloned().unwrap_or(Type::Any))
}

fn conv_method(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let recv = child(env, t, "recv")?;
    let name_node = child(env, t, "name")?;
    let args_node = child(env, t, "args")?;
    let mname = name_node.tokenize().to_string();

    let mut rcode = String::new();
    let rty = conv(env, recv, &mut rcode)?;

    // package member call: `math.sqrt(2)`
    if let Type::Module(pkg_name) = env.pool.real_type(&rty) {
        let positional = args_node
            .subs()
            .iter()
            .filter(|a| a.tag != Tag::DataExpr)
            .count();
        let entry = symbols::package(&pkg_name).and_then(|p| {
            let key = format!("{}@{}", mname, positional);
            p.get(key.as_str())
                .cloned()
                .or_else(|| p.get(mname.as_str()).cloned())
        });
        return match entry {
            Some(PackageEntry::Sym(sym)) => {
                let fty = instantiate(env, &sym.ty);
                if !matches!(fty, Type::Func(_)) {
                    out.push_str(&sym.code);
                    return Ok(fty);
                }
                let params = fty.params().to_vec();
                let codes = convert_args(env, &mname, t, args_node.subs(), &params)?;
                out.push_str(&format!("{}({})", sym.code, codes.join(", ")));
                Ok(fty.ret().cloned().unwrap_or(Type::Any))
            }
            Some(PackageEntry::Unsupported(n)) => {
                Err(env.perror(name_node, "Unsupported", vec![n.to_string()]))
            }
            None => Err(env.perror(
                name_node,
                "UndefinedFunction",
                vec![format!("{}.{}", pkg_name, mname)],
            )),
        };
    }

    match symbols::method(&mname) {
        Some(msym) => {
            let mty = instantiate(env, &msym.ty);
            let params = mty.params().to_vec();
            if let Some(recv_expected) = params.first() {
                if !recv_expected.clone().accept(&rty, &mut env.pool, true) {
                    let exp = env.pool.resolved(recv_expected).display(&env.pool);
                    let off = env.pool.resolved(&rty).display(&env.pool);
                    return Err(env.perror(recv, "TypeError", vec![exp, off]));
                }
            }
            let rest = params.get(1..).unwrap_or(&[]).to_vec();
            let codes = convert_args(env, &mname, t, args_node.subs(), &rest)?;
            let mut all = vec![rcode];
            all.extend(codes);
            out.push_str(&format!("{}({})", msym.code, all.join(", ")));
            Ok(mty.ret().cloned().unwrap_or(Type::Any))
        }
        None => Err(env.perror(name_node, "UndefinedMethod", vec![mname])),
    }
}

fn conv_get_field(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let recv = child(env, t, "recv")?;
    let name_node = child(env, t, "name")?;
    let fname = name_node.tokenize().to_string();

    // package constant: `math.pi`
    if recv.tag == Tag::Name {
        if let Some(pkg_name) = env.import_package(recv.tokenize()) {
            if let Some(pkg) = symbols::package(&pkg_name) {
                return match pkg.get(fname.as_str()) {
                    Some(PackageEntry::Sym(sym)) => {
                        out.push_str(&sym.code);
                        Ok(sym.ty.clone())
                    }
                    Some(PackageEntry::Unsupported(n)) => {
                        Err(env.perror(name_node, "Unsupported", vec![n.to_string()]))
                    }
                    None => Err(env.perror(
                        name_node,
                        "UndefinedName",
                        vec![format!("{}.{}", pkg_name, fname)],
                    )),
                };
            }
        }
    }

    let mut rcv = String::new();
    conv(env, recv, &mut rcv)?;
    if symbols::static_field(&fname).is_none() {
        let recv_is_matter = recv.tag == Tag::Name
            && env
                .get_symbol(recv.tokenize())
                .map(|s| s.is_matter)
                .unwrap_or(false);
        if !recv_is_matter {
            env.pwarn(name_node, "UnknownName", vec![fname.clone()]);
        }
    }
    let acc = env.field_accessor(&fname);
    out.push_str(&acc.getter.replace("{0}", &rcv));
    Ok(acc.ty)
}

fn conv_index(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let recv = child(env, t, "recv")?;
    let index = child(env, t, "index")?;
    let mut rcv = String::new();
    let rty = conv(env, recv, &mut rcv)?;
    let mut idx = String::new();
    let ity = conv(env, index, &mut idx)?;
    if !Type::Number.accept(&ity, &mut env.pool, true) {
        let off = env.pool.resolved(&ity).display(&env.pool);
        return Err(env.perror(index, "TypeError", vec!["number".to_string(), off]));
    }
    let tid = env.token_id(t);
    out.push_str(&format!("lib.index({}, {}, codemap[{}])", rcv, idx, tid));

    let elem = match env.pool.real_type(&rty) {
        Type::Str => Type::Str,
        Type::List(e) => *e,
        other => {
            let v = env.pool.new_var();
            let _ = Type::list_of(v.clone()).accept(&other, &mut env.pool, true);
            v
        }
    };
    Ok(elem)
}

fn conv_slice(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let recv = child(env, t, "recv")?;
    let mut rcv = String::new();
    let rty = conv(env, recv, &mut rcv)?;
    let lo = match t.get("low") {
        Some(e) => {
            let mut c = String::new();
            conv(env, e, &mut c)?;
            c
        }
        None => "0".to_string(),
    };
    let hi = match t.get("high") {
        Some(e) => {
            let mut c = String::new();
            conv(env, e, &mut c)?;
            c
        }
        None => "undefined".to_string(),
    };
    out.push_str(&format!("lib.slice({}, {}, {})", rcv, lo, hi));
    Ok(env.pool.real_type(&rty))
}

fn conv_tuple(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let mut codes = Vec::new();
    let mut types = Vec::new();
    for s in t.subs() {
        let mut c = String::new();
        let ty = conv(env, s, &mut c)?;
        codes.push(c);
        types.push(ty);
    }
    // a pair of numbers is 2D-vector sugar
    let numeric = codes.len() == 2
        && types
            .iter()
            .all(|ty| Type::Number.accept(ty, &mut env.pool, false));
    if numeric {
        for ty in &types {
            let _ = Type::Number.accept(ty, &mut env.pool, true);
        }
        out.push_str(&format!("lib.vec2({}, {})", codes[0], codes[1]));
        return Ok(Type::Vec2);
    }
    out.push_str(&format!("[{}]", codes.join(", ")));
    Ok(Type::list_of(Type::Any))
}

fn conv_data(env: &mut Env, t: &ParseTree, out: &mut String) -> Result<Type, Cancel> {
    let mut parts = Vec::new();
    for kv in t.subs() {
        let key_node = child(env, kv, "key")?;
        let value = child(env, kv, "value")?;
        let key = key_node.tokenize().to_string();
        let mut vcode = String::new();
        let vty = conv(env, value, &mut vcode)?;
        match symbols::static_field(&key) {
            Some(acc) => {
                if !acc.ty.accept(&vty, &mut env.pool, true) {
                    let exp = env.pool.resolved(&acc.ty).display(&env.pool);
                    let off = env.pool.resolved(&vty).display(&env.pool);
                    env.pwarn(value, "TypeError", vec![exp, off]);
                }
            }
            None => env.pwarn(key_node, "UnknownName", vec![key.clone()]),
        }
        parts.push(format!("'{}': {}", key, vcode));
    }
    out.push_str(&format!("{{ {} }}", parts.join(", ")));
    Ok(Type::Option)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn transpile(src: &str) -> (String, Env) {
        let (tree, events) = parse_source(src);
        assert!(events.is_empty(), "syntax errors: {:?}", events);
        let mut env = Env::new();
        let mut out = String::new();
        let _ = conv(&mut env, &tree, &mut out);
        (out, env)
    }

    #[test]
    fn test_quote_js_escapes() {
        assert_eq!(quote_js("a'b"), "'a\\'b'");
        assert_eq!(quote_js("a\\b"), "'a\\\\b'");
        assert_eq!(quote_js("ab"), "'ab'");
    }

    #[test]
    fn test_global_assignment() {
        let (out, env) = transpile("x = 1\n");
        assert!(out.contains("vars['x'] = 1;"));
        assert!(env.errors.is_empty());
    }

    #[test]
    fn test_floor_division_lowering() {
        let (out, _) = transpile("x = 7 // 3\n");
        assert!(out.contains("((7 / 3) | 0)"));
    }

    #[test]
    fn test_power_lowering() {
        let (out, _) = transpile("x = 2 ** 3\n");
        assert!(out.contains("Math.pow(2, 3)"));
    }

    #[test]
    fn test_cancelled_statement_leaves_no_output() {
        let (out, env) = transpile("x = 1\ny = nosuch\nz = 2\n");
        assert_eq!(env.errors.len(), 1);
        assert_eq!(env.errors[0].key, "UndefinedName");
        assert!(out.contains("vars['x']"));
        assert!(out.contains("vars['z']"));
        assert!(!out.contains("vars['y']"));
    }

    #[test]
    fn test_elif_nests_in_else_branch() {
        let (out, _) = transpile("if 1 > 2:\n    x = 1\nelif 2 > 1:\n    x = 2\n");
        assert!(out.contains("} else {"));
        assert_eq!(out.matches("if (").count(), 2);
    }

    #[test]
    fn test_import_alias_members() {
        let (out, env) = transpile("import math as m\nx = m.pi\ny = m.sqrt(2)\n");
        assert!(env.errors.is_empty());
        assert!(out.contains("Math.PI"));
        assert!(out.contains("Math.sqrt(2)"));
    }

    #[test]
    fn test_augmented_assignment_desugars() {
        let (out, _) = transpile("x = 1\nx += 2\n");
        assert!(out.contains("vars['x'] = (vars['x'] + 2);"));
    }

    #[test]
    fn test_method_receiver_passed_first() {
        let (out, env) = transpile("xs = [1]\nxs.append(2)\n");
        assert!(env.errors.is_empty());
        assert!(out.contains("lib.append(vars['xs'], 2);"));
    }

    #[test]
    fn test_unsupported_builtin_reported() {
        let (_, env) = transpile("s = input()\n");
        assert_eq!(env.errors.len(), 1);
        assert_eq!(env.errors[0].key, "Unsupported");
    }
}
