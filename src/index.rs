//! The workspace index: one cached parse per known file path, the merged
//! cross-file global symbol table, and cancellable retrieval.
//!
//! The index is the sole mutator of its caches; callers only read through
//! its operations. Per path, at most one (re)parse is in flight at a time:
//! a newer request for the same path cancels and supersedes the older one,
//! and a superseded or cancelled parse never reaches the cache, so the cache
//! can never regress to a stale result.

use std::{
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Instant,
};

use lsp_types::SemanticToken;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, error, info};

use crate::{
	builtins,
	cancel::CancellationToken,
	checksum::Checksum,
	error::Error,
	parser::{self, ParseOptions, ParsedResult},
	scan, semtok,
	sym::{self, GlobalSymbol, RoutineKind, SymbolSource, Uses},
	validate::ValidatorSet,
};

#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
	/// Run the post-parse rule set as part of each pipeline.
	pub post_process: bool,
	/// Keep per-file token caches after serving a semantic-token request,
	/// for hosts that issue bursts of requests against one file. Off by
	/// default; `evict_transient` works either way.
	pub retain_token_cache: bool,
}

impl Default for IndexOptions {
	fn default() -> Self {
		Self {
			post_process: true,
			retain_token_cache: false,
		}
	}
}

/// The authoritative cache slot for one file.
#[derive(Debug, Clone)]
pub struct IndexEntry {
	pub path: PathBuf,
	pub parsed: Arc<ParsedResult>,
	pub checksum: Checksum,
}

#[derive(Debug)]
struct InFlight {
	cancel: CancellationToken,
	generation: u64,
}

pub struct WorkspaceIndex {
	entries: RwLock<FxHashMap<PathBuf, IndexEntry>>,
	global: RwLock<FxHashMap<String, GlobalSymbol>>,
	builtins: FxHashMap<String, GlobalSymbol>,
	tokens_by_file: Mutex<FxHashMap<PathBuf, Vec<scan::Token>>>,
	in_flight: Mutex<FxHashMap<PathBuf, InFlight>>,
	next_generation: AtomicU64,
	validators: ValidatorSet,
	options: IndexOptions,
}

impl Default for WorkspaceIndex {
	fn default() -> Self {
		Self::new(IndexOptions::default())
	}
}

impl WorkspaceIndex {
	#[must_use]
	pub fn new(options: IndexOptions) -> Self {
		let builtins = builtins::table();

		Self {
			entries: RwLock::new(FxHashMap::default()),
			global: RwLock::new(builtins.clone()),
			builtins,
			tokens_by_file: Mutex::new(FxHashMap::default()),
			in_flight: Mutex::new(FxHashMap::default()),
			next_generation: AtomicU64::new(0),
			validators: ValidatorSet::default(),
			options,
		}
	}

	/// Cached, cancellable retrieval of one file's parse.
	///
	/// With `source` given, that text is analyzed; otherwise the file is read
	/// from disk (failing with [`Error::NotFound`]). If the new checksum
	/// matches the cached one the cached result comes back untouched; only
	/// a real change dispatches the pipeline to a worker.
	pub fn get_parsed(
		&self,
		path: &Path,
		source: Option<&str>,
		cancel: &CancellationToken,
		options: ParseOptions,
	) -> Result<Arc<ParsedResult>, Error> {
		cancel.throw_if_cancelled()?;

		let code = match source {
			Some(s) => s.to_string(),
			None => std::fs::read_to_string(path)
				.map_err(|_| Error::NotFound(path.to_path_buf()))?,
		};

		let checksum = Checksum::of(&code);

		if let Some(entry) = self.entries.read().get(path) {
			// A shallow cached result cannot serve a full-detail request.
			if entry.checksum == checksum && (entry.parsed.has_detail || !options.full) {
				return Ok(entry.parsed.clone());
			}
		}

		debug!("(Re)parsing: {}", path.display());

		let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);

		{
			let mut in_flight = self.in_flight.lock();

			let prev = in_flight.insert(
				path.to_path_buf(),
				InFlight {
					cancel: cancel.clone(),
					generation,
				},
			);

			if let Some(prev) = prev {
				// Latest request wins; the superseded parse gets cancelled
				// rather than queued behind this one.
				prev.cancel.cancel();
			}
		}

		let (sender, receiver) = crossbeam_channel::bounded(1);

		{
			let cancel = cancel.clone();
			let worker_path = path.to_path_buf();

			let validators = if self.options.post_process {
				self.validators.clone()
			} else {
				ValidatorSet::empty()
			};

			rayon::spawn(move || {
				let _ = sender.send(parser::pipeline(
					&code,
					options,
					&cancel,
					&validators,
					&worker_path,
				));
			});
		}

		let result = receiver
			.recv()
			.map_err(|_| Error::process("parse worker terminated without a result"))?;

		let mut in_flight = self.in_flight.lock();
		let ours = in_flight.get(path).is_some_and(|f| f.generation == generation);

		match result {
			Ok(parsed) => {
				let parsed = Arc::new(parsed);

				if ours {
					in_flight.remove(path);
					drop(in_flight);
					self.publish(path, parsed.clone(), checksum);
				}
				// A superseded result is still correct for the text this
				// caller handed in; it just must not touch the cache.

				Ok(parsed)
			}
			Err(err) => {
				if ours {
					in_flight.remove(path);
				}

				Err(err)
			}
		}
	}

	/// Classified highlight ranges for `code`, in source order.
	///
	/// Serving this does not require a prior cache entry for `path`; the
	/// token scan it needs is transient and evicted immediately unless the
	/// index was configured to retain it.
	pub fn get_semantic_tokens(
		&self,
		path: &Path,
		code: &str,
	) -> Result<Vec<SemanticToken>, Error> {
		let parsed = self.get_parsed(
			path,
			Some(code),
			&CancellationToken::new(),
			ParseOptions::default(),
		)?;

		let (tokens, _) = scan::tokenize(code);

		let ret = {
			let globals = self.global.read();
			semtok::walk(&tokens, &parsed, &globals)
		};

		if self.options.retain_token_cache {
			self.tokens_by_file.lock().insert(path.to_path_buf(), tokens);
		}

		Ok(ret)
	}

	/// Drops non-authoritative per-file caches. The authoritative parse
	/// entry always survives this.
	pub fn evict_transient(&self, path: &Path) {
		let _ = self.tokens_by_file.lock().remove(path);
	}

	/// Forgets a file entirely, retracting its global symbol contributions.
	pub fn remove_file(&self, path: &Path) {
		self.evict_transient(path);

		if self.entries.write().remove(path).is_none() {
			return;
		}

		let mut globals = self.global.write();
		retract_contributions(&mut globals, &self.builtins, path);
	}

	/// Walks `root` for Strand sources and parses them in parallel,
	/// honoring `cancel`. Returns how many files were discovered.
	pub fn index_workspace(
		&self,
		root: &Path,
		cancel: &CancellationToken,
	) -> Result<usize, Error> {
		let start_time = Instant::now();
		let mut paths = vec![];

		let walker = walkdir::WalkDir::new(root)
			.follow_links(false)
			.max_depth(16)
			.same_file_system(true)
			.into_iter()
			.filter_map(|result| match result {
				Ok(d_e) => Some(d_e),
				Err(err) => {
					error!("Failed to inspect a workspace file: {err}");
					None
				}
			});

		for d_ent in walker {
			let path = d_ent.path();

			if path.is_dir() {
				continue;
			}

			if path
				.extension()
				.is_some_and(|ext| ext.eq_ignore_ascii_case("strand"))
			{
				paths.push(path.to_path_buf());
			}
		}

		let validators = if self.options.post_process {
			self.validators.clone()
		} else {
			ValidatorSet::empty()
		};

		paths.par_iter().try_for_each(|path| {
			cancel.throw_if_cancelled()?;

			let code = match std::fs::read_to_string(path) {
				Ok(c) => c,
				Err(err) => {
					// One unreadable file must not poison the aggregate.
					error!("Failed to read {}: {err}", path.display());
					return Ok::<(), Error>(());
				}
			};

			let parsed =
				parser::pipeline(&code, ParseOptions::default(), cancel, &validators, path)?;
			let checksum = parsed.checksum;
			self.publish(path, Arc::new(parsed), checksum);
			Ok(())
		})?;

		info!(
			"Indexed {} file(s) in {}ms.",
			paths.len(),
			start_time.elapsed().as_millis()
		);

		Ok(paths.len())
	}

	/// Snapshot of the merged global table, name-ordered.
	#[must_use]
	pub fn global_symbols(&self) -> Vec<GlobalSymbol> {
		let mut ret: Vec<_> = self.global.read().values().cloned().collect();
		ret.sort_by(|a, b| a.name.cmp(&b.name));
		ret
	}

	#[must_use]
	pub fn lookup_global(&self, name: &str) -> Option<GlobalSymbol> {
		self.global.read().get(&sym::canonical(name)).cloned()
	}

	/// The names a file referenced that the whole workspace still cannot
	/// resolve, now that cross-file and builtin symbols are in view.
	#[must_use]
	pub fn unresolved_uses(&self, path: &Path) -> Option<Uses> {
		let entries = self.entries.read();
		let entry = entries.get(path)?;
		let globals = self.global.read();

		let mut ret = Uses::default();

		for name in &entry.parsed.uses.func {
			let found = globals
				.get(name)
				.is_some_and(|g| g.kind == RoutineKind::Function);

			if !found {
				ret.func.insert(name.clone());
			}
		}

		for name in &entry.parsed.uses.pro {
			let found = globals
				.get(name)
				.is_some_and(|g| g.kind == RoutineKind::Procedure);

			if !found {
				ret.pro.insert(name.clone());
			}
		}

		Some(ret)
	}

	#[must_use]
	pub fn files(&self) -> Vec<PathBuf> {
		let mut ret: Vec<_> = self.entries.read().keys().cloned().collect();
		ret.sort();
		ret
	}

	#[must_use]
	pub fn cached_checksum(&self, path: &Path) -> Option<Checksum> {
		self.entries.read().get(path).map(|e| e.checksum)
	}

	#[must_use]
	pub fn has_transient(&self, path: &Path) -> bool {
		self.tokens_by_file.lock().contains_key(path)
	}

	fn publish(&self, path: &Path, parsed: Arc<ParsedResult>, checksum: Checksum) {
		{
			let mut globals = self.global.write();
			retract_contributions(&mut globals, &self.builtins, path);

			for gsym in &parsed.global {
				globals.insert(gsym.name.clone(), gsym.clone());
			}
		}

		self.entries.write().insert(
			path.to_path_buf(),
			IndexEntry {
				path: path.to_path_buf(),
				parsed,
				checksum,
			},
		);
	}
}

/// Removes a file's user symbols from the merged table, restoring any
/// builtin that a user definition had shadowed.
fn retract_contributions(
	globals: &mut FxHashMap<String, GlobalSymbol>,
	builtins: &FxHashMap<String, GlobalSymbol>,
	path: &Path,
) {
	let stale: Vec<String> = globals
		.iter()
		.filter(|(_, g)| g.source == SymbolSource::User && g.file == path)
		.map(|(name, _)| name.clone())
		.collect();

	for name in stale {
		globals.remove(&name);

		if let Some(builtin) = builtins.get(&name) {
			globals.insert(name, builtin.clone());
		}
	}
}
