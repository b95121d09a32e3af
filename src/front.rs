//! The resolver: populates the global routine table, per-routine local
//! variable tables, per-routine compile directives, structural types for
//! structure literals, and the cross-file `uses` set.
//!
//! Names referenced but not defined in the file at hand are never flagged
//! here; they go into [`Uses`] for the workspace index to resolve, since a
//! single file has no visibility into its neighbors.

use std::path::Path;

use lsp_types::Diagnostic;
use rustc_hash::FxHashSet;

use crate::{
	diag::{self, DiagCode},
	scan::{Span, Token, TokenKind},
	sym::{
		self, CompileOpts, FieldDirection, FieldSource, FieldSpec, GlobalSymbol, LocalScope,
		LocalSymbol, LocalTables, ParamSpec, RoutineKind, SymbolSource, TypeSpec, Uses,
	},
	syntax::{NodeKind, SyntaxNode},
};

#[derive(Debug, Default)]
pub(crate) struct Resolution {
	pub(crate) global: Vec<GlobalSymbol>,
	pub(crate) local: LocalTables,
	pub(crate) compile: CompileOpts,
	pub(crate) uses: Uses,
	pub(crate) diags: Vec<Diagnostic>,
}

pub(crate) fn resolve(tree: &mut SyntaxNode, tokens: &[Token], file: &Path) -> Resolution {
	let mut res = Resolution::default();

	let doc_lines = full_line_comments(tokens);

	// First pass: the global routine table, so that body resolution knows
	// which names live in this file.
	for node in &tree.children {
		let Some(kind) = node.routine_kind() else {
			continue;
		};

		// A declaration that never got a name already has its diagnostic.
		if node.text.is_empty() {
			continue;
		}

		let gsym = declare_routine(kind, node, file, &doc_lines);

		if let Some(existing) = res
			.global
			.iter_mut()
			.find(|g| g.kind == gsym.kind && g.name == gsym.name)
		{
			*existing = gsym;
		} else {
			res.global.push(gsym);
		}
	}

	let funcs: FxHashSet<String> = res
		.global
		.iter()
		.filter(|g| g.kind == RoutineKind::Function)
		.map(|g| g.name.clone())
		.collect();

	let pros: FxHashSet<String> = res
		.global
		.iter()
		.filter(|g| g.kind == RoutineKind::Procedure)
		.map(|g| g.name.clone())
		.collect();

	// Second pass: routine bodies and the main-level program.
	let mut main_scope = LocalScope::default();
	let mut main_opts = vec![];
	let mut main_seen_exec = false;

	for node in &mut tree.children {
		match node.routine_kind() {
			Some(_) if node.text.is_empty() => {}
			Some(kind) => {
				let name = sym::canonical(&node.text);

				let mut scope = LocalScope::default();
				let mut opts = vec![];

				let mut ctx = ScopeCtx {
					scope: &mut scope,
					opts: &mut opts,
					uses: &mut res.uses,
					diags: &mut res.diags,
					funcs: &funcs,
					pros: &pros,
					seen_exec: false,
					ret_types: vec![],
				};

				for child in node.children.iter_mut() {
					match child.kind {
						NodeKind::Ident => {}
						NodeKind::ParamName => {
							define_param(ctx.scope, child);
						}
						NodeKind::KeywordParam => {
							if let Some(var) = child.children.first() {
								define_param(ctx.scope, var);
							}
						}
						_ => resolve_stmt(child, &mut ctx),
					}
				}

				let ret_types = ctx.ret_types;

				if kind == RoutineKind::Function {
					if let Some(structure) = ret_types.iter().find(|t| t.is_structure()) {
						if let Some(gsym) = res
							.global
							.iter_mut()
							.find(|g| g.kind == kind && g.name == name)
						{
							gsym.fields = structure.fields.values().cloned().collect();
						}
					}
				}

				match kind {
					RoutineKind::Function => {
						res.local.func.insert(name.clone(), scope);
						res.compile.func.insert(name, opts);
					}
					RoutineKind::Procedure => {
						res.local.pro.insert(name.clone(), scope);
						res.compile.pro.insert(name, opts);
					}
				}
			}
			None => {
				if node.kind == NodeKind::MainEnd {
					continue;
				}

				let mut ctx = ScopeCtx {
					scope: &mut main_scope,
					opts: &mut main_opts,
					uses: &mut res.uses,
					diags: &mut res.diags,
					funcs: &funcs,
					pros: &pros,
					seen_exec: main_seen_exec,
					ret_types: vec![],
				};

				resolve_stmt(node, &mut ctx);
				main_seen_exec = ctx.seen_exec;
			}
		}
	}

	res.local.main = main_scope;
	res.compile.main = main_opts;

	res
}

fn declare_routine(
	kind: RoutineKind,
	node: &SyntaxNode,
	file: &Path,
	doc_lines: &rustc_hash::FxHashMap<u32, String>,
) -> GlobalSymbol {
	let name_span = node
		.children
		.first()
		.filter(|c| c.kind == NodeKind::Ident)
		.map_or(node.span, |c| c.span);

	let mut args = vec![];
	let mut kws = vec![];

	for child in &node.children {
		match child.kind {
			NodeKind::ParamName => args.push(ParamSpec {
				display: child.text.to_string(),
				name: sym::canonical(&child.text),
				keyword: false,
				span: child.span,
			}),
			NodeKind::KeywordParam => kws.push(ParamSpec {
				display: child.text.to_string(),
				name: sym::canonical(&child.text),
				keyword: true,
				span: child.span,
			}),
			_ => {}
		}
	}

	GlobalSymbol {
		kind,
		name: sym::canonical(&node.text),
		display: node.text.to_string(),
		file: file.to_path_buf(),
		span: name_span,
		args,
		kws,
		docs: docs_above(doc_lines, node.span.start.line),
		source: SymbolSource::User,
		fields: vec![],
	}
}

fn define_param(scope: &mut LocalScope, node: &SyntaxNode) {
	let key = sym::canonical(&node.text);

	scope.entry(key.clone()).or_insert_with(|| LocalSymbol {
		name: key,
		display: node.text.to_string(),
		span: node.span,
		usage: vec![node.span],
		types: vec![],
		defined: true,
	});
}

struct ScopeCtx<'a> {
	scope: &'a mut LocalScope,
	opts: &'a mut Vec<String>,
	uses: &'a mut Uses,
	diags: &'a mut Vec<Diagnostic>,
	funcs: &'a FxHashSet<String>,
	pros: &'a FxHashSet<String>,
	seen_exec: bool,
	ret_types: Vec<TypeSpec>,
}

fn resolve_stmt(node: &mut SyntaxNode, ctx: &mut ScopeCtx) {
	match node.kind {
		NodeKind::CompileOpt => {
			if ctx.seen_exec {
				ctx.diags
					.push(diag::build(DiagCode::DirectiveNotFirst, node.span));
			} else {
				for child in &node.children {
					ctx.opts.push(sym::canonical(&child.text));
				}
			}
		}
		NodeKind::Assign => {
			ctx.seen_exec = true;

			let types = match node.children.get_mut(1) {
				Some(rhs) => infer_expr(rhs, ctx),
				None => vec![],
			};

			if let Some(target) = node.children.first_mut() {
				match target.kind {
					NodeKind::Ident => {
						define_local(ctx.scope, &target.text, target.span, types, true);
					}
					NodeKind::Member => {
						if let Some((base, path)) = member_chain(target) {
							member_access(ctx, base, &path, Some(&types));
						}
					}
					_ => {}
				}
			}
		}
		NodeKind::ProcedureCall => {
			ctx.seen_exec = true;

			let name = sym::canonical(&node.text);

			if !ctx.pros.contains(&name) {
				ctx.uses.pro.insert(name);
			}

			for arg in node.children.iter_mut() {
				let _ = infer_expr(arg, ctx);
			}
		}
		NodeKind::ExprStmt => {
			ctx.seen_exec = true;

			for child in node.children.iter_mut() {
				let _ = infer_expr(child, ctx);
			}
		}
		NodeKind::Return => {
			ctx.seen_exec = true;

			if let Some(value) = node.children.first_mut() {
				let types = infer_expr(value, ctx);
				merge_type_list(&mut ctx.ret_types, types);
			}
		}
		NodeKind::If | NodeKind::While => {
			ctx.seen_exec = true;

			if let Some(cond) = node.children.first_mut() {
				let _ = infer_expr(cond, ctx);
			}

			for branch in node.children.iter_mut().skip(1) {
				resolve_stmt(branch, ctx);
			}
		}
		NodeKind::For => {
			ctx.seen_exec = true;

			let from_types = match node.children.get_mut(1) {
				Some(from) => infer_expr(from, ctx),
				None => vec![],
			};

			if let Some(var) = node.children.first() {
				if var.kind == NodeKind::Ident {
					let (text, span) = (var.text.to_string(), var.span);
					define_local(ctx.scope, &text, span, from_types, true);
				}
			}

			for rest in node.children.iter_mut().skip(2) {
				match rest.kind {
					NodeKind::Block => resolve_stmt(rest, ctx),
					_ if rest.routine_kind().is_none() => {
						// Bound expression or inline body statement.
						if matches!(
							rest.kind,
							NodeKind::Assign
								| NodeKind::ProcedureCall | NodeKind::If
								| NodeKind::While | NodeKind::For
								| NodeKind::Return | NodeKind::ExprStmt
						) {
							resolve_stmt(rest, ctx);
						} else {
							let _ = infer_expr(rest, ctx);
						}
					}
					_ => {}
				}
			}
		}
		NodeKind::Block => {
			for child in node.children.iter_mut() {
				resolve_stmt(child, ctx);
			}
		}
		_ => {
			ctx.seen_exec = true;
			let _ = infer_expr(node, ctx);
		}
	}
}

fn define_local(
	scope: &mut LocalScope,
	display: &str,
	span: Span,
	types: Vec<TypeSpec>,
	defined: bool,
) {
	let key = sym::canonical(display);

	match scope.get_mut(&key) {
		Some(local) => {
			local.usage.push(span);
			local.merge_types(types);

			if defined {
				local.defined = true;
			}
		}
		None => {
			scope.insert(
				key.clone(),
				LocalSymbol {
					name: key,
					display: display.to_string(),
					span,
					usage: vec![span],
					types,
					defined,
				},
			);
		}
	}
}

fn infer_expr(node: &mut SyntaxNode, ctx: &mut ScopeCtx) -> Vec<TypeSpec> {
	let types = match node.kind {
		NodeKind::Number => {
			let text: &str = &node.text;
			let float = text.contains(['.', 'e', 'E', 'd', 'D']);
			let name = if float { sym::TY_FLOAT } else { sym::TY_INT };
			vec![TypeSpec::with_value(name, text)]
		}
		NodeKind::Str => {
			vec![TypeSpec::with_value(sym::TY_STRING, &string_value(&node.text))]
		}
		NodeKind::Ident => {
			let (text, span) = (node.text.to_string(), node.span);
			define_local(ctx.scope, &text, span, vec![], false);

			ctx.scope
				.get(&sym::canonical(&text))
				.map(|local| local.types.clone())
				.unwrap_or_default()
		}
		NodeKind::StructLit => {
			let mut structure = TypeSpec::structure();

			for field in node.children.iter_mut() {
				if field.kind != NodeKind::StructField {
					continue;
				}

				let field_types = match field.children.first_mut() {
					Some(value) => infer_expr(value, ctx),
					None => vec![],
				};

				let key = sym::canonical(&field.text);

				if !structure.fields.contains_key(&key) {
					structure.fields.insert(
						key,
						FieldSpec {
							display: field.text.to_string(),
							types: field_types,
							direction: FieldDirection::Bidirectional,
							source: FieldSource::User,
							docs: String::new(),
							span: field.span,
						},
					);
				}
			}

			vec![structure]
		}
		NodeKind::Member => match member_chain(node) {
			Some((base, path)) => member_access(ctx, base, &path, None),
			None => {
				for child in node.children.iter_mut() {
					let _ = infer_expr(child, ctx);
				}

				vec![]
			}
		},
		NodeKind::Call => {
			let name = sym::canonical(&node.text);

			if ctx.scope.contains_key(&name) {
				// Locals shadow function calls; `v(0)` reads `v`.
				let span = node.children.first().map_or(node.span, |c| c.span);
				define_local(ctx.scope, &node.text.to_string(), span, vec![], false);
			} else if !ctx.funcs.contains(&name) {
				ctx.uses.func.insert(name);
			}

			for arg in node.children.iter_mut().skip(1) {
				let _ = infer_expr(arg, ctx);
			}

			vec![]
		}
		NodeKind::KwArg | NodeKind::Paren => match node.children.first_mut() {
			Some(inner) => infer_expr(inner, ctx),
			None => vec![],
		},
		NodeKind::Unary => {
			let inner = match node.children.first_mut() {
				Some(operand) => infer_expr(operand, ctx),
				None => vec![],
			};

			if node.text.eq_ignore_ascii_case("not") {
				vec![TypeSpec::scalar(sym::TY_INT)]
			} else {
				inner.into_iter().map(strip_value).collect()
			}
		}
		NodeKind::Binary => {
			let lhs = match node.children.first_mut() {
				Some(l) => infer_expr(l, ctx),
				None => vec![],
			};

			let rhs = match node.children.get_mut(1) {
				Some(r) => infer_expr(r, ctx),
				None => vec![],
			};

			binary_result(&node.text, &lhs, &rhs)
		}
		_ => vec![],
	};

	if let Some(first) = types.first() {
		node.ty = Some(first.clone());
	}

	types
}

/// Strips the literal quotes and un-doubles embedded quote characters.
#[must_use]
fn string_value(lexeme: &str) -> String {
	let Some(quote) = lexeme.chars().next() else {
		return String::new();
	};

	let mut inner = lexeme.strip_prefix(quote).unwrap_or(lexeme);
	inner = inner.strip_suffix(quote).unwrap_or(inner);

	let doubled: String = [quote, quote].iter().collect();
	inner.replace(&doubled, &quote.to_string())
}

#[must_use]
fn strip_value(mut ty: TypeSpec) -> TypeSpec {
	ty.value = None;
	ty
}

#[must_use]
fn binary_result(op: &str, lhs: &[TypeSpec], rhs: &[TypeSpec]) -> Vec<TypeSpec> {
	let arithmetic = matches!(op, "+" | "-" | "*" | "/" | "^");

	if !arithmetic {
		// Relational and logical expressions always evaluate to Int.
		return vec![TypeSpec::scalar(sym::TY_INT)];
	}

	let has = |list: &[TypeSpec], name: &str| list.iter().any(|t| t.name == name);

	if op == "+" && has(lhs, sym::TY_STRING) && has(rhs, sym::TY_STRING) {
		return vec![TypeSpec::scalar(sym::TY_STRING)];
	}

	if has(lhs, sym::TY_FLOAT) || has(rhs, sym::TY_FLOAT) {
		return vec![TypeSpec::scalar(sym::TY_FLOAT)];
	}

	if has(lhs, sym::TY_INT) && has(rhs, sym::TY_INT) {
		return vec![TypeSpec::scalar(sym::TY_INT)];
	}

	vec![]
}

pub(crate) fn merge_type_list(into: &mut Vec<TypeSpec>, incoming: Vec<TypeSpec>) {
	for ty in incoming {
		if !into.iter().any(|have| have.same_shape(&ty)) {
			into.push(ty);
		}
	}
}

/// Flattens `x.a.b` into its base variable and field path. Returns `None`
/// for chains rooted in anything other than a plain identifier.
#[must_use]
fn member_chain(node: &SyntaxNode) -> Option<((String, Span), Vec<(String, Span)>)> {
	let mut fields = vec![];
	let mut cur = node;

	while cur.kind == NodeKind::Member {
		fields.push((cur.text.to_string(), cur.span));
		cur = cur.child(0)?;
	}

	if cur.kind != NodeKind::Ident {
		return None;
	}

	fields.reverse();
	Some(((cur.text.to_string(), cur.span), fields))
}

/// Reads or writes through a member chain, updating field directions on the
/// base variable's structure types as usage is observed.
fn member_access(
	ctx: &mut ScopeCtx,
	base: (String, Span),
	path: &[(String, Span)],
	write_types: Option<&Vec<TypeSpec>>,
) -> Vec<TypeSpec> {
	let (base_name, base_span) = base;
	let key = sym::canonical(&base_name);

	if !ctx.scope.contains_key(&key) {
		ctx.scope.insert(
			key.clone(),
			LocalSymbol {
				name: key.clone(),
				display: base_name,
				span: base_span,
				usage: vec![],
				types: vec![],
				defined: false,
			},
		);
	}

	let Some(local) = ctx.scope.get_mut(&key) else {
		return vec![];
	};

	local.usage.push(base_span);

	if write_types.is_some() && !local.types.iter().any(TypeSpec::is_structure) {
		local.types.push(TypeSpec::structure());
	}

	let mut out = vec![];

	for ty in local.types.iter_mut().filter(|t| t.is_structure()) {
		walk_fields(ty, path, write_types, &mut out, 0);
	}

	out
}

fn walk_fields(
	ty: &mut TypeSpec,
	path: &[(String, Span)],
	write_types: Option<&Vec<TypeSpec>>,
	out: &mut Vec<TypeSpec>,
	depth: usize,
) {
	let Some((name, span)) = path.get(depth) else {
		return;
	};

	let key = sym::canonical(name);
	let last = depth + 1 == path.len();
	let writing = write_types.is_some();

	if !ty.fields.contains_key(&key) {
		ty.fields.insert(
			key.clone(),
			FieldSpec {
				display: name.clone(),
				types: vec![],
				direction: if last && writing {
					FieldDirection::Output
				} else {
					FieldDirection::Input
				},
				source: FieldSource::Inferred,
				docs: String::new(),
				span: *span,
			},
		);
	} else if let Some(field) = ty.fields.get_mut(&key) {
		field.direction = match (field.direction, last && writing) {
			(FieldDirection::Input, true) => FieldDirection::Bidirectional,
			(FieldDirection::Output, false) => FieldDirection::Bidirectional,
			(dir, _) => dir,
		};
	}

	let Some(field) = ty.fields.get_mut(&key) else {
		return;
	};

	if last {
		if let Some(incoming) = write_types {
			merge_type_list(&mut field.types, incoming.clone());
		} else {
			out.extend(field.types.iter().cloned());
		}

		return;
	}

	if writing && !field.types.iter().any(TypeSpec::is_structure) {
		field.types.push(TypeSpec::structure());
	}

	for nested in field.types.iter_mut().filter(|t| t.is_structure()) {
		walk_fields(nested, path, write_types, out, depth + 1);
	}
}

/// Comment lines that stand alone (no code before them on their line), for
/// attributing doc text to the routine declared directly below.
#[must_use]
fn full_line_comments(tokens: &[Token]) -> rustc_hash::FxHashMap<u32, String> {
	let mut map = rustc_hash::FxHashMap::default();
	let mut at_line_start = true;

	for token in tokens {
		match token.kind {
			TokenKind::Newline => at_line_start = true,
			TokenKind::Comment => {
				if at_line_start {
					let text = token.text.trim_start_matches(';').trim().to_string();
					map.insert(token.pos.line, text);
				}

				at_line_start = false;
			}
			_ => at_line_start = false,
		}
	}

	map
}

#[must_use]
fn docs_above(doc_lines: &rustc_hash::FxHashMap<u32, String>, routine_line: u32) -> String {
	let mut collected = vec![];
	let mut line = routine_line;

	while line > 0 {
		line -= 1;

		match doc_lines.get(&line) {
			Some(text) => collected.push(text.as_str()),
			None => break,
		}
	}

	collected.reverse();
	collected.join("\n")
}
