//! Syntax tree construction with statement-level error recovery.
//!
//! The builder consumes the scanner's token stream and produces a strict
//! ownership tree; parents own children and nothing points back up. A
//! malformed statement becomes an [`NodeKind::Error`] node plus a diagnostic
//! and the builder resynchronizes at the next statement boundary, so one bad
//! statement never suppresses findings for the rest of the file.

use lsp_types::Diagnostic;

use crate::{
	cancel::CancellationToken,
	diag::{self, DiagCode},
	error::Error,
	scan::{Pos, Span, Token, TokenKind},
	sym::{RoutineKind, TypeSpec},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
	File,

	Procedure,
	Function,
	ParamName,
	KeywordParam,

	CompileOpt,
	Assign,
	ProcedureCall,
	ExprStmt,
	If,
	For,
	While,
	Return,
	Block,
	/// The `end` closing a main-level program.
	MainEnd,

	Ident,
	Number,
	Str,
	StructLit,
	StructField,
	Member,
	Call,
	KwArg,
	Unary,
	Binary,
	Paren,

	Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
	pub kind: NodeKind,
	pub span: Span,
	/// Name, operator, or literal lexeme, depending on `kind`. Empty for
	/// purely structural nodes.
	pub text: Box<str>,
	pub children: Vec<SyntaxNode>,
	/// Filled in by the resolver for expression nodes it can type.
	pub ty: Option<TypeSpec>,
}

impl SyntaxNode {
	#[must_use]
	pub(crate) fn new(kind: NodeKind, span: Span) -> Self {
		Self {
			kind,
			span,
			text: "".into(),
			children: vec![],
			ty: None,
		}
	}

	#[must_use]
	pub(crate) fn leaf(kind: NodeKind, token: &Token) -> Self {
		Self {
			kind,
			span: token.span(),
			text: token.text.clone(),
			children: vec![],
			ty: None,
		}
	}

	#[must_use]
	pub fn child(&self, n: usize) -> Option<&SyntaxNode> {
		self.children.get(n)
	}

	#[must_use]
	pub fn routine_kind(&self) -> Option<RoutineKind> {
		match self.kind {
			NodeKind::Procedure => Some(RoutineKind::Procedure),
			NodeKind::Function => Some(RoutineKind::Function),
			_ => None,
		}
	}

	/// Pre-order traversal. Parent context, where resolution needs it, is
	/// passed along by the walker's own stack rather than stored in the tree.
	pub fn preorder<'n>(&'n self, visit: &mut impl FnMut(&'n SyntaxNode)) {
		visit(self);

		for child in &self.children {
			child.preorder(visit);
		}
	}
}

/// Builds a tree from `tokens`. `full` selects complete structural recovery;
/// the shallow pass only recovers routine signatures, for callers that need
/// an outline and nothing else.
///
/// The only error this returns is [`Error::Canceled`]; the token is polled at
/// every statement boundary so a cancel lands promptly even in large files.
pub(crate) fn build(
	tokens: &[Token],
	full: bool,
	cancel: &CancellationToken,
) -> Result<(SyntaxNode, Vec<Diagnostic>), Error> {
	let mut builder = TreeBuilder {
		tokens,
		at: 0,
		full,
		cancel,
		prev_end: Pos::default(),
		recovered: false,
		diags: vec![],
	};

	let tree = builder.file()?;
	Ok((tree, builder.diags))
}

struct TreeBuilder<'t> {
	tokens: &'t [Token],
	at: usize,
	full: bool,
	cancel: &'t CancellationToken,
	prev_end: Pos,
	/// Set when recovery has already resynchronized to a statement boundary,
	/// so the terminator handling does not consume the statement after the
	/// malformed one.
	recovered: bool,
	diags: Vec<Diagnostic>,
}

impl TreeBuilder<'_> {
	// Token cursor ////////////////////////////////////////////////////////////

	#[must_use]
	fn peek(&self) -> Option<&Token> {
		self.tokens[self.at..]
			.iter()
			.find(|t| t.kind != TokenKind::Comment)
	}

	#[must_use]
	fn peek_kind(&self) -> Option<TokenKind> {
		self.peek().map(|t| t.kind)
	}

	#[must_use]
	fn peek_nth(&self, n: usize) -> Option<&Token> {
		self.tokens[self.at..]
			.iter()
			.filter(|t| t.kind != TokenKind::Comment)
			.nth(n)
	}

	fn bump(&mut self) -> Option<&Token> {
		while let Some(token) = self.tokens.get(self.at) {
			self.at += 1;

			if token.kind != TokenKind::Comment {
				self.prev_end = token.span().end;
				return Some(token);
			}
		}

		None
	}

	fn eat(&mut self, kind: TokenKind) -> Option<&Token> {
		if self.peek_kind() == Some(kind) {
			self.bump()
		} else {
			None
		}
	}

	#[must_use]
	fn here(&self) -> Pos {
		self.peek().map_or(self.prev_end, |t| t.pos)
	}

	#[must_use]
	fn span_from(&self, start: Pos) -> Span {
		Span::new(start, self.prev_end)
	}

	fn skip_newlines(&mut self) {
		while self.peek_kind() == Some(TokenKind::Newline) {
			let _ = self.bump();
		}
	}

	/// Recovery point: drop tokens until the next statement boundary.
	fn sync_to_boundary(&mut self) {
		loop {
			match self.peek_kind() {
				None => return,
				Some(TokenKind::Newline) => {
					let _ = self.bump();
					return;
				}
				Some(kind)
					if kind.is_block_terminator()
						|| matches!(kind, TokenKind::KwPro | TokenKind::KwFunction) =>
				{
					return;
				}
				Some(_) => {
					let _ = self.bump();
				}
			}
		}
	}

	fn unexpected_here(&mut self) -> SyntaxNode {
		let start = self.here();
		self.diags
			.push(diag::build(DiagCode::UnexpectedToken, Span::at(start, 1)));
		self.sync_to_boundary();
		self.recovered = true;
		SyntaxNode::new(NodeKind::Error, self.span_from(start))
	}

	// File and routines ///////////////////////////////////////////////////////

	fn file(&mut self) -> Result<SyntaxNode, Error> {
		let mut file = SyntaxNode::new(NodeKind::File, Span::default());

		loop {
			self.skip_newlines();

			let Some(kind) = self.peek_kind() else {
				break;
			};

			match kind {
				TokenKind::KwPro | TokenKind::KwFunction => {
					file.children.push(self.routine()?);
				}
				TokenKind::KwEnd => {
					let start = self.here();
					let _ = self.bump();
					file.children
						.push(SyntaxNode::new(NodeKind::MainEnd, self.span_from(start)));
					self.end_statement();
				}
				TokenKind::KwEndIf
				| TokenKind::KwEndElse
				| TokenKind::KwEndFor
				| TokenKind::KwEndWhile => {
					let start = self.here();
					self.diags
						.push(diag::build(DiagCode::MismatchedEnd, Span::at(start, 1)));
					let _ = self.bump();
					self.end_statement();
				}
				_ => {
					if self.full {
						let stmt = self.statement()?;
						file.children.push(stmt);
					} else {
						self.cancel.throw_if_cancelled()?;
						self.sync_to_boundary();
					}
				}
			}
		}

		file.span = file
			.children
			.iter()
			.fold(Span::default(), |acc, c| acc.cover(c.span));

		Ok(file)
	}

	fn routine(&mut self) -> Result<SyntaxNode, Error> {
		self.cancel.throw_if_cancelled()?;

		let start = self.here();
		let kind = match self.bump().map(|t| t.kind) {
			Some(TokenKind::KwFunction) => NodeKind::Function,
			_ => NodeKind::Procedure,
		};

		let mut node = SyntaxNode::new(kind, Span::at(start, 0));

		match self.eat(TokenKind::Ident) {
			Some(name) => {
				node.text = name.text.clone();
				let name_node = SyntaxNode::leaf(NodeKind::Ident, name);
				node.children.push(name_node);
			}
			None => {
				self.diags.push(diag::build(
					DiagCode::MissingRoutineName,
					Span::at(start, 1),
				));
				self.sync_to_boundary();
				node.span = self.span_from(start);
				return Ok(node);
			}
		}

		while self.eat(TokenKind::Comma).is_some() {
			let Some(param) = self.eat(TokenKind::Ident) else {
				let _ = self.unexpected_here();
				break;
			};

			let param = SyntaxNode::leaf(NodeKind::ParamName, param);

			// `kw = var` declares a keyword; a bare name is positional.
			if self.eat(TokenKind::Assign).is_some() {
				let mut kw = SyntaxNode::new(NodeKind::KeywordParam, param.span);
				kw.text = param.text.clone();

				match self.eat(TokenKind::Ident) {
					Some(var) => {
						kw.children.push(SyntaxNode::leaf(NodeKind::ParamName, var));
						kw.span = self.span_from(kw.span.start);
					}
					None => {
						let _ = self.unexpected_here();
					}
				}

				node.children.push(kw);
			} else {
				node.children.push(param);
			}
		}

		self.end_statement();

		if self.full {
			self.routine_body(&mut node, start)?;
		} else {
			self.shallow_skip_body(start)?;
		}

		node.span = self.span_from(start);
		Ok(node)
	}

	fn routine_body(&mut self, node: &mut SyntaxNode, start: Pos) -> Result<(), Error> {
		loop {
			self.skip_newlines();

			let Some(kind) = self.peek_kind() else {
				self.diags
					.push(diag::build(DiagCode::UnclosedBlock, Span::at(start, 1)));
				return Ok(());
			};

			match kind {
				TokenKind::KwEnd => {
					let _ = self.bump();
					self.end_statement();
					return Ok(());
				}
				k if k.is_block_terminator() => {
					// `endif` and friends close the routine anyway, with a
					// complaint, so a stray terminator cannot eat the file.
					self.diags
						.push(diag::build(DiagCode::MismatchedEnd, Span::at(self.here(), 1)));
					let _ = self.bump();
					self.end_statement();
					return Ok(());
				}
				TokenKind::KwPro | TokenKind::KwFunction => {
					self.diags
						.push(diag::build(DiagCode::UnclosedBlock, Span::at(start, 1)));
					return Ok(());
				}
				_ => {
					let stmt = self.statement()?;
					node.children.push(stmt);
				}
			}
		}
	}

	/// The outline pass: body statements produce no nodes at all. Nesting
	/// still has to be tracked so that `begin ... endfor` blocks inside the
	/// body do not end the routine early.
	fn shallow_skip_body(&mut self, start: Pos) -> Result<(), Error> {
		let mut depth = 0_u32;
		let mut line_start = true;

		loop {
			self.cancel.throw_if_cancelled()?;

			let Some(token) = self.peek() else {
				self.diags
					.push(diag::build(DiagCode::UnclosedBlock, Span::at(start, 1)));
				return Ok(());
			};

			match token.kind {
				TokenKind::KwBegin => {
					depth += 1;
					line_start = false;
					let _ = self.bump();
				}
				k if k.is_block_terminator() => {
					let _ = self.bump();

					if depth == 0 {
						return Ok(());
					}

					depth -= 1;
					line_start = false;
				}
				TokenKind::Newline => {
					line_start = true;
					let _ = self.bump();
				}
				TokenKind::KwPro | TokenKind::KwFunction if line_start => {
					self.diags
						.push(diag::build(DiagCode::UnclosedBlock, Span::at(start, 1)));
					return Ok(());
				}
				_ => {
					line_start = false;
					let _ = self.bump();
				}
			}
		}
	}

	// Statements //////////////////////////////////////////////////////////////

	fn statement(&mut self) -> Result<SyntaxNode, Error> {
		let stmt = self.inner_statement()?;
		self.end_statement();
		Ok(stmt)
	}

	fn inner_statement(&mut self) -> Result<SyntaxNode, Error> {
		self.cancel.throw_if_cancelled()?;

		let start = self.here();

		let Some(kind) = self.peek_kind() else {
			return Ok(SyntaxNode::new(NodeKind::Error, Span::at(start, 0)));
		};

		match kind {
			TokenKind::KwCompileOpt => {
				let _ = self.bump();
				let mut node = SyntaxNode::new(NodeKind::CompileOpt, Span::at(start, 0));

				match self.eat(TokenKind::Ident) {
					Some(first) => {
						node.children.push(SyntaxNode::leaf(NodeKind::Ident, first));

						while self.eat(TokenKind::Comma).is_some() {
							match self.eat(TokenKind::Ident) {
								Some(more) => {
									node.children.push(SyntaxNode::leaf(NodeKind::Ident, more));
								}
								None => {
									let _ = self.unexpected_here();
									break;
								}
							}
						}
					}
					None => {
						let _ = self.unexpected_here();
					}
				}

				node.span = self.span_from(start);
				Ok(node)
			}
			TokenKind::KwReturn => {
				let _ = self.bump();
				let mut node = SyntaxNode::new(NodeKind::Return, Span::at(start, 0));

				if self.eat(TokenKind::Comma).is_some() {
					let value = self.expr()?;
					node.children.push(value);
				}

				node.span = self.span_from(start);
				Ok(node)
			}
			TokenKind::KwIf => self.if_statement(start),
			TokenKind::KwFor => self.for_statement(start),
			TokenKind::KwWhile => self.while_statement(start),
			TokenKind::Ident => self.call_or_assign(start),
			_ => Ok(self.unexpected_here()),
		}
	}

	fn if_statement(&mut self, start: Pos) -> Result<SyntaxNode, Error> {
		let _ = self.bump();
		let mut node = SyntaxNode::new(NodeKind::If, Span::at(start, 0));

		let cond = self.expr()?;
		node.children.push(cond);

		if self.eat(TokenKind::KwThen).is_none() {
			let _ = self.unexpected_here();
			node.span = self.span_from(start);
			return Ok(node);
		}

		let then_branch = self.branch_body(TokenKind::KwEndIf)?;
		node.children.push(then_branch);

		if self.eat(TokenKind::KwElse).is_some() {
			let else_branch = self.branch_body(TokenKind::KwEndElse)?;
			node.children.push(else_branch);
		}

		node.span = self.span_from(start);
		Ok(node)
	}

	fn for_statement(&mut self, start: Pos) -> Result<SyntaxNode, Error> {
		let _ = self.bump();
		let mut node = SyntaxNode::new(NodeKind::For, Span::at(start, 0));

		let Some(var) = self.eat(TokenKind::Ident) else {
			let _ = self.unexpected_here();
			node.span = self.span_from(start);
			return Ok(node);
		};

		node.children.push(SyntaxNode::leaf(NodeKind::Ident, var));

		if self.eat(TokenKind::Assign).is_none() {
			let _ = self.unexpected_here();
			node.span = self.span_from(start);
			return Ok(node);
		}

		let from = self.expr()?;
		node.children.push(from);

		if self.eat(TokenKind::Comma).is_none() {
			let _ = self.unexpected_here();
			node.span = self.span_from(start);
			return Ok(node);
		}

		let to = self.expr()?;
		node.children.push(to);

		if self.eat(TokenKind::Comma).is_some() {
			let step = self.expr()?;
			node.children.push(step);
		}

		if self.eat(TokenKind::KwDo).is_none() {
			let _ = self.unexpected_here();
			node.span = self.span_from(start);
			return Ok(node);
		}

		let body = self.branch_body(TokenKind::KwEndFor)?;
		node.children.push(body);

		node.span = self.span_from(start);
		Ok(node)
	}

	fn while_statement(&mut self, start: Pos) -> Result<SyntaxNode, Error> {
		let _ = self.bump();
		let mut node = SyntaxNode::new(NodeKind::While, Span::at(start, 0));

		let cond = self.expr()?;
		node.children.push(cond);

		if self.eat(TokenKind::KwDo).is_none() {
			let _ = self.unexpected_here();
			node.span = self.span_from(start);
			return Ok(node);
		}

		let body = self.branch_body(TokenKind::KwEndWhile)?;
		node.children.push(body);

		node.span = self.span_from(start);
		Ok(node)
	}

	/// Either a `begin ... end<closer>` block or a single inline statement.
	fn branch_body(&mut self, closer: TokenKind) -> Result<SyntaxNode, Error> {
		let start = self.here();

		if self.eat(TokenKind::KwBegin).is_none() {
			return self.inner_statement();
		}

		let mut block = SyntaxNode::new(NodeKind::Block, Span::at(start, 0));

		loop {
			self.skip_newlines();

			let Some(kind) = self.peek_kind() else {
				self.diags
					.push(diag::build(DiagCode::UnclosedBlock, Span::at(start, 1)));
				break;
			};

			if kind.is_block_terminator() {
				if kind != closer && kind != TokenKind::KwEnd {
					self.diags
						.push(diag::build(DiagCode::MismatchedEnd, Span::at(self.here(), 1)));
				}

				let _ = self.bump();
				break;
			}

			if matches!(kind, TokenKind::KwPro | TokenKind::KwFunction) {
				self.diags
					.push(diag::build(DiagCode::UnclosedBlock, Span::at(start, 1)));
				break;
			}

			let stmt = self.statement()?;
			block.children.push(stmt);
		}

		block.span = self.span_from(start);
		Ok(block)
	}

	fn call_or_assign(&mut self, start: Pos) -> Result<SyntaxNode, Error> {
		let Some(first) = self.eat(TokenKind::Ident) else {
			return Ok(self.unexpected_here());
		};

		let mut target = SyntaxNode::leaf(NodeKind::Ident, first);

		while self.peek_kind() == Some(TokenKind::Dot) {
			let _ = self.bump();

			let Some(field) = self.eat(TokenKind::Ident) else {
				let _ = self.unexpected_here();
				return Ok(SyntaxNode::new(NodeKind::Error, self.span_from(start)));
			};

			let mut member = SyntaxNode::leaf(NodeKind::Member, field);
			member.span = self.span_from(start);
			member.children.push(target);
			target = member;
		}

		match self.peek_kind() {
			Some(TokenKind::Assign) => {
				let _ = self.bump();
				let rhs = self.expr()?;

				let mut node = SyntaxNode::new(NodeKind::Assign, Span::at(start, 0));
				node.children.push(target);
				node.children.push(rhs);
				node.span = self.span_from(start);
				Ok(node)
			}
			Some(TokenKind::LParen) if target.kind == NodeKind::Ident => {
				// `f(x)` in statement position; syntactically a function
				// call, so resolution tracks it under the function uses.
				let call = self.call_postfix(target)?;
				let mut node = SyntaxNode::new(NodeKind::ExprStmt, call.span);
				node.children.push(call);
				Ok(node)
			}
			_ if target.kind == NodeKind::Ident => {
				let mut node = SyntaxNode::new(NodeKind::ProcedureCall, target.span);
				node.text = target.text.clone();

				while self.eat(TokenKind::Comma).is_some() {
					let arg = self.call_arg()?;
					node.children.push(arg);
				}

				node.span = self.span_from(start);
				Ok(node)
			}
			_ => Ok(self.unexpected_here()),
		}
	}

	// Expressions /////////////////////////////////////////////////////////////

	fn expr(&mut self) -> Result<SyntaxNode, Error> {
		self.binary_expr(0)
	}

	const BINARY_TIERS: &'static [&'static [TokenKind]] = &[
		&[TokenKind::KwOr],
		&[TokenKind::KwAnd],
		&[
			TokenKind::KwEq,
			TokenKind::KwNe,
			TokenKind::KwLt,
			TokenKind::KwLe,
			TokenKind::KwGt,
			TokenKind::KwGe,
		],
		&[TokenKind::Plus, TokenKind::Minus],
		&[TokenKind::Star, TokenKind::Slash],
		&[TokenKind::Caret],
	];

	fn binary_expr(&mut self, tier: usize) -> Result<SyntaxNode, Error> {
		let Some(ops) = Self::BINARY_TIERS.get(tier) else {
			return self.unary_expr();
		};

		let mut lhs = self.binary_expr(tier + 1)?;

		while let Some(kind) = self.peek_kind() {
			if !ops.contains(&kind) {
				break;
			}

			let op = match self.bump() {
				Some(t) => t.text.clone(),
				None => break,
			};

			let rhs = self.binary_expr(tier + 1)?;

			let mut node = SyntaxNode::new(NodeKind::Binary, lhs.span.cover(rhs.span));
			node.text = op;
			node.children.push(lhs);
			node.children.push(rhs);
			lhs = node;
		}

		Ok(lhs)
	}

	fn unary_expr(&mut self) -> Result<SyntaxNode, Error> {
		let start = self.here();

		match self.peek_kind() {
			Some(TokenKind::Minus | TokenKind::Plus | TokenKind::KwNot) => {
				let op = match self.bump() {
					Some(t) => t.text.clone(),
					None => "".into(),
				};

				let operand = self.unary_expr()?;

				let mut node = SyntaxNode::new(NodeKind::Unary, self.span_from(start));
				node.text = op;
				node.children.push(operand);
				Ok(node)
			}
			_ => self.postfix_expr(),
		}
	}

	fn postfix_expr(&mut self) -> Result<SyntaxNode, Error> {
		let start = self.here();
		let mut base = self.primary_expr()?;

		loop {
			match self.peek_kind() {
				Some(TokenKind::LParen) if matches!(base.kind, NodeKind::Ident) => {
					base = self.call_postfix(base)?;
				}
				Some(TokenKind::Dot) => {
					let _ = self.bump();

					let Some(field) = self.eat(TokenKind::Ident) else {
						let _ = self.unexpected_here();
						return Ok(SyntaxNode::new(NodeKind::Error, self.span_from(start)));
					};

					let mut member = SyntaxNode::leaf(NodeKind::Member, field);
					member.span = self.span_from(start);
					member.children.push(base);
					base = member;
				}
				_ => break,
			}
		}

		Ok(base)
	}

	fn call_postfix(&mut self, callee: SyntaxNode) -> Result<SyntaxNode, Error> {
		let start = callee.span.start;
		let _ = self.bump();

		let mut call = SyntaxNode::new(NodeKind::Call, callee.span);
		call.text = callee.text.clone();
		call.children.push(callee);

		if self.peek_kind() != Some(TokenKind::RParen) {
			loop {
				let arg = self.call_arg()?;
				call.children.push(arg);

				if self.eat(TokenKind::Comma).is_none() {
					break;
				}
			}
		}

		if self.eat(TokenKind::RParen).is_none() {
			let _ = self.unexpected_here();
		}

		call.span = self.span_from(start);
		Ok(call)
	}

	fn call_arg(&mut self) -> Result<SyntaxNode, Error> {
		if self.peek_kind() == Some(TokenKind::Ident)
			&& self.peek_nth(1).map(|t| t.kind) == Some(TokenKind::Assign)
		{
			let start = self.here();

			let kw_text = match self.bump() {
				Some(t) => t.text.clone(),
				None => "".into(),
			};

			let _ = self.bump();
			let value = self.expr()?;

			let mut node = SyntaxNode::new(NodeKind::KwArg, Span::at(start, 0));
			node.text = kw_text;
			node.children.push(value);
			node.span = self.span_from(start);
			return Ok(node);
		}

		self.expr()
	}

	fn primary_expr(&mut self) -> Result<SyntaxNode, Error> {
		let start = self.here();

		match self.peek_kind() {
			Some(TokenKind::Number) => {
				let token = match self.bump() {
					Some(t) => t,
					None => return Ok(SyntaxNode::new(NodeKind::Error, Span::at(start, 0))),
				};

				Ok(SyntaxNode::leaf(NodeKind::Number, token))
			}
			Some(TokenKind::Str) => {
				let token = match self.bump() {
					Some(t) => t,
					None => return Ok(SyntaxNode::new(NodeKind::Error, Span::at(start, 0))),
				};

				Ok(SyntaxNode::leaf(NodeKind::Str, token))
			}
			Some(TokenKind::Ident) => {
				let token = match self.bump() {
					Some(t) => t,
					None => return Ok(SyntaxNode::new(NodeKind::Error, Span::at(start, 0))),
				};

				Ok(SyntaxNode::leaf(NodeKind::Ident, token))
			}
			Some(TokenKind::LParen) => {
				let _ = self.bump();
				let inner = self.expr()?;

				if self.eat(TokenKind::RParen).is_none() {
					let _ = self.unexpected_here();
				}

				let mut node = SyntaxNode::new(NodeKind::Paren, self.span_from(start));
				node.children.push(inner);
				Ok(node)
			}
			Some(TokenKind::LBrace) => self.struct_literal(start),
			_ => Ok(self.unexpected_here()),
		}
	}

	fn struct_literal(&mut self, start: Pos) -> Result<SyntaxNode, Error> {
		let _ = self.bump();
		let mut node = SyntaxNode::new(NodeKind::StructLit, Span::at(start, 0));

		if self.peek_kind() != Some(TokenKind::RBrace) {
			loop {
				let field_start = self.here();

				let Some(name) = self.eat(TokenKind::Ident) else {
					let _ = self.unexpected_here();
					node.span = self.span_from(start);
					return Ok(node);
				};

				let mut field = SyntaxNode::leaf(NodeKind::StructField, name);

				if self.eat(TokenKind::Colon).is_none() {
					let _ = self.unexpected_here();
					node.span = self.span_from(start);
					return Ok(node);
				}

				let value = self.expr()?;
				field.children.push(value);
				field.span = self.span_from(field_start);
				node.children.push(field);

				if self.eat(TokenKind::Comma).is_none() {
					break;
				}
			}
		}

		if self.eat(TokenKind::RBrace).is_none() {
			let _ = self.unexpected_here();
		}

		node.span = self.span_from(start);
		Ok(node)
	}

	/// Consumes the statement terminator. A terminator is a newline, the end
	/// of the stream, or a boundary keyword left for the enclosing construct.
	fn end_statement(&mut self) {
		if self.recovered {
			// Recovery already moved the cursor to the next boundary.
			self.recovered = false;
			return;
		}

		match self.peek_kind() {
			None | Some(TokenKind::KwElse) => {}
			Some(TokenKind::Newline) => {
				let _ = self.bump();
			}
			Some(kind)
				if kind.is_block_terminator()
					|| matches!(kind, TokenKind::KwPro | TokenKind::KwFunction) => {}
			Some(_) => {
				let here = self.here();
				self.diags
					.push(diag::build(DiagCode::UnexpectedToken, Span::at(here, 1)));
				self.sync_to_boundary();
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::scan;

	fn build_full(code: &str) -> (SyntaxNode, Vec<Diagnostic>) {
		let (tokens, _) = scan::tokenize(code);
		build(&tokens, true, &CancellationToken::new()).unwrap()
	}

	#[test]
	fn routine_skeleton() {
		let (tree, diags) = build_full("pro myPro, a, b, key=k\n  x = 1\nend");
		assert!(diags.is_empty());

		let routine = &tree.children[0];
		assert_eq!(routine.kind, NodeKind::Procedure);
		assert_eq!(&*routine.text, "myPro");

		let kinds: Vec<_> = routine.children.iter().map(|c| c.kind).collect();
		assert_eq!(
			kinds,
			vec![
				NodeKind::Ident,
				NodeKind::ParamName,
				NodeKind::ParamName,
				NodeKind::KeywordParam,
				NodeKind::Assign,
			]
		);
	}

	#[test]
	fn error_recovery_keeps_later_statements() {
		let (tree, diags) = build_full("pro p\n  x = = 1\n  y = 2\nend");
		assert!(diags.iter().any(|d| crate::diag::has_code(d, DiagCode::UnexpectedToken)));

		let routine = &tree.children[0];
		let assigns = routine
			.children
			.iter()
			.filter(|c| c.kind == NodeKind::Assign)
			.count();

		// `y = 2` must survive the malformed line before it.
		assert!(assigns >= 1);
		assert!(routine
			.children
			.iter()
			.any(|c| c.kind == NodeKind::Error || c.kind == NodeKind::Assign));
	}

	#[test]
	fn struct_literal_nests() {
		let (tree, diags) = build_full("pro p\n  s = {a: 'x', b: {c: 1}}\nend");
		assert!(diags.is_empty());

		let assign = &tree.children[0].children[0];
		let lit = &assign.children[1];
		assert_eq!(lit.kind, NodeKind::StructLit);
		assert_eq!(lit.children.len(), 2);
		assert_eq!(lit.children[1].children[0].kind, NodeKind::StructLit);
	}

	#[test]
	fn block_statements() {
		let code = "pro p\n  if x gt 1 then begin\n    y = 2\n  endif else z = 3\nend";
		let (tree, diags) = build_full(code);
		assert!(diags.is_empty(), "{diags:#?}");

		let if_node = &tree.children[0].children[0];
		assert_eq!(if_node.kind, NodeKind::If);
		assert_eq!(if_node.children.len(), 3);
		assert_eq!(if_node.children[1].kind, NodeKind::Block);
		assert_eq!(if_node.children[2].kind, NodeKind::Assign);
	}

	#[test]
	fn mismatched_terminator_is_reported() {
		let (_, diags) = build_full("pro p\n  for i = 0, 9 do begin\n    x = i\n  endwhile\nend");
		assert!(diags.iter().any(|d| crate::diag::has_code(d, DiagCode::MismatchedEnd)));
	}

	#[test]
	fn unclosed_routine_is_reported() {
		let (_, diags) = build_full("pro p\n  x = 1\n");
		assert!(diags.iter().any(|d| crate::diag::has_code(d, DiagCode::UnclosedBlock)));
	}

	#[test]
	fn shallow_mode_keeps_signatures_only() {
		let code = "function f, a\n  if a gt 1 then begin\n    b = 2\n  endif\n  return, a\nend\npro q\n  x = 3\nend";
		let (tokens, _) = scan::tokenize(code);
		let (tree, diags) = build(&tokens, false, &CancellationToken::new()).unwrap();

		assert!(diags.is_empty(), "{diags:#?}");
		assert_eq!(tree.children.len(), 2);
		assert_eq!(tree.children[0].kind, NodeKind::Function);
		assert_eq!(tree.children[1].kind, NodeKind::Procedure);
		// No body statements in the outline.
		assert!(tree.children[0].children.iter().all(|c| matches!(
			c.kind,
			NodeKind::Ident | NodeKind::ParamName | NodeKind::KeywordParam
		)));
	}

	#[test]
	fn cancellation_aborts_build() {
		let (tokens, _) = scan::tokenize("pro p\n  x = 1\n  y = 2\nend");
		let token = CancellationToken::new();
		token.cancel();

		assert!(matches!(
			build(&tokens, true, &token),
			Err(Error::Canceled)
		));
	}

	#[test]
	fn main_level_end_is_marked() {
		let (tree, _) = build_full("x = 1\nprint, x\nend");
		assert!(tree.children.iter().any(|c| c.kind == NodeKind::MainEnd));
	}

	#[test]
	fn procedure_call_with_keyword() {
		let (tree, diags) = build_full("plot, x, thick=2\nend");
		assert!(diags.is_empty());

		let call = &tree.children[0];
		assert_eq!(call.kind, NodeKind::ProcedureCall);
		assert_eq!(&*call.text, "plot");
		assert_eq!(call.children[1].kind, NodeKind::KwArg);
	}
}
