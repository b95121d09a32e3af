use std::path::Path;

use indoc::indoc;

use crate::{
	cancel::CancellationToken,
	diag::{self, DiagCode},
	index::{IndexOptions, WorkspaceIndex},
	parser::ParseOptions,
	sym::{FieldDirection, FieldSource, RoutineKind, SymbolSource},
	Error,
};

fn logging() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn cache_hit_is_idempotent() {
	logging();

	let index = WorkspaceIndex::default();
	let path = Path::new("cache.strand");
	let code = "pro cached\n  x = 1\nend";

	let first = index
		.get_parsed(path, Some(code), &CancellationToken::new(), ParseOptions::default())
		.unwrap();

	let second = index
		.get_parsed(path, Some(code), &CancellationToken::new(), ParseOptions::default())
		.unwrap();

	// Unchanged text comes back as the same cached result, not a reparse.
	assert!(std::sync::Arc::ptr_eq(&first, &second));
	assert_eq!(first, second);
}

#[test]
fn cache_invalidates_on_change() {
	let index = WorkspaceIndex::default();
	let path = Path::new("invalidate.strand");

	let v1 = "pro one\nend";
	let v2 = "pro two\nend";

	let first = index
		.get_parsed(path, Some(v1), &CancellationToken::new(), ParseOptions::default())
		.unwrap();

	let sum1 = index.cached_checksum(path).unwrap();
	assert_eq!(first.global[0].name, "one");

	let second = index
		.get_parsed(path, Some(v2), &CancellationToken::new(), ParseOptions::default())
		.unwrap();

	let sum2 = index.cached_checksum(path).unwrap();
	assert_eq!(second.global[0].name, "two");
	assert_ne!(sum1, sum2);
	assert_eq!(second.checksum, sum2);

	// The retracted symbol is gone from the merged table.
	assert!(index.lookup_global("one").is_none());
	assert!(index.lookup_global("two").is_some());
}

#[test]
fn cancelled_request_leaves_cache_alone() {
	let index = WorkspaceIndex::default();
	let path = Path::new("cancelled.strand");

	let v1 = "pro keepme\nend";

	index
		.get_parsed(path, Some(v1), &CancellationToken::new(), ParseOptions::default())
		.unwrap();

	let sum1 = index.cached_checksum(path).unwrap();

	let cancelled = CancellationToken::new();
	cancelled.cancel();

	let result = index.get_parsed(
		path,
		Some("pro replacement\nend"),
		&cancelled,
		ParseOptions::default(),
	);

	assert!(matches!(result, Err(Error::Canceled)));
	assert_eq!(index.cached_checksum(path).unwrap(), sum1);
	assert!(index.lookup_global("keepme").is_some());
	assert!(index.lookup_global("replacement").is_none());
}

#[test]
fn newer_request_supersedes_older() {
	logging();

	let index = std::sync::Arc::new(WorkspaceIndex::default());
	let path = Path::new("supersede.strand");

	// Large enough that the statement-boundary cancellation polls get a
	// chance to observe the supersede before the build finishes.
	let mut big = String::from("pro big\n");
	for i in 0..20_000 {
		big.push_str(&format!("  v{i} = {i}\n"));
	}
	big.push_str("end\n");

	let older_token = CancellationToken::new();
	let older_index = index.clone();
	let older_observer = older_token.clone();

	let older = std::thread::spawn(move || {
		older_index.get_parsed(
			Path::new("supersede.strand"),
			Some(&big),
			&older_token,
			ParseOptions::default(),
		)
	});

	// Wait for the older request to get in flight.
	while !older_observer.cancel_requested() && !older.is_finished() {
		let newer = index.get_parsed(
			path,
			Some("pro small\nend"),
			&CancellationToken::new(),
			ParseOptions::default(),
		);

		if newer.is_ok() {
			break;
		}
	}

	let older_result = older.join().unwrap();

	// Whatever happened to the older call, the newest completed request
	// owns the cache; it never regresses to the older text.
	let final_sum = index.cached_checksum(path).unwrap();
	let small_parsed = index
		.get_parsed(
			path,
			Some("pro small\nend"),
			&CancellationToken::new(),
			ParseOptions::default(),
		)
		.unwrap();

	assert_eq!(final_sum, small_parsed.checksum);

	if let Err(err) = older_result {
		assert!(err.is_cancellation());
	}
}

#[test]
fn semantic_token_cache_is_transient() {
	let path = Path::new("semtok.strand");
	let code = "pro p\n  s = {a: 1}\n  print, s.a\nend";

	let index = WorkspaceIndex::default();
	let tokens = index.get_semantic_tokens(path, code).unwrap();
	assert!(!tokens.is_empty());
	// Default policy: evicted as soon as the request is served.
	assert!(!index.has_transient(path));
	// The authoritative entry is untouched by transient eviction.
	assert!(index.cached_checksum(path).is_some());

	let retaining = WorkspaceIndex::new(IndexOptions {
		retain_token_cache: true,
		..IndexOptions::default()
	});

	let _ = retaining.get_semantic_tokens(path, code).unwrap();
	assert!(retaining.has_transient(path));

	retaining.evict_transient(path);
	assert!(!retaining.has_transient(path));
	assert!(retaining.cached_checksum(path).is_some());
}

#[test]
fn cross_file_uses_resolve_against_workspace() {
	let index = WorkspaceIndex::default();

	let caller = Path::new("caller.strand");
	let callee = Path::new("callee.strand");

	let caller_code = indoc! {"
		pro drive
			r = shared_helper(5)
		end
	"};

	let parsed = index
		.get_parsed(caller, Some(caller_code), &CancellationToken::new(), ParseOptions::default())
		.unwrap();

	// Single-file resolution records the reference instead of flagging it.
	assert!(parsed.uses.func.contains("shared_helper"));
	assert!(parsed.problems().all(|d| !diag::has_code(d, DiagCode::UnexpectedToken)));

	let unresolved = index.unresolved_uses(caller).unwrap();
	assert!(unresolved.func.contains("shared_helper"));

	let callee_code = indoc! {"
		function shared_helper, x
			return, x * 2
		end
	"};

	index
		.get_parsed(callee, Some(callee_code), &CancellationToken::new(), ParseOptions::default())
		.unwrap();

	let unresolved = index.unresolved_uses(caller).unwrap();
	assert!(unresolved.func.is_empty());
}

#[test]
fn global_identity_is_case_insensitive_last_write_wins() {
	let index = WorkspaceIndex::default();

	index
		.get_parsed(
			Path::new("a.strand"),
			Some("pro Alpha\nend"),
			&CancellationToken::new(),
			ParseOptions::default(),
		)
		.unwrap();

	index
		.get_parsed(
			Path::new("b.strand"),
			Some("PRO ALPHA\nend"),
			&CancellationToken::new(),
			ParseOptions::default(),
		)
		.unwrap();

	let gsym = index.lookup_global("alpha").unwrap();
	assert_eq!(gsym.display, "ALPHA");
	assert_eq!(gsym.file, Path::new("b.strand"));

	let count = index
		.global_symbols()
		.iter()
		.filter(|g| g.name == "alpha")
		.count();

	assert_eq!(count, 1);
}

#[test]
fn anonymous_structure_types_through_the_index() {
	let index = WorkspaceIndex::default();
	let path = Path::new("not-real.strand");

	let code = indoc! {"
		pro myPro
			compile_opt strict

			a = {a: 'string', $
				b: `string`}

		end
	"};

	let parsed = index
		.get_parsed(path, Some(code), &CancellationToken::new(), ParseOptions::default())
		.unwrap();

	let scope = parsed.local.pro.get("mypro").unwrap();
	let a = scope.get("a").unwrap();

	assert!(a.defined);
	assert_eq!(a.usage.len(), 1);
	assert_eq!(a.types.len(), 1);

	let structure = &a.types[0];
	assert!(structure.is_structure());
	assert_eq!(structure.fields.len(), 2);

	for (key, value) in [("a", "string"), ("b", "string")] {
		let field = structure.fields.get(key).unwrap();
		assert_eq!(field.display, key);
		assert_eq!(field.types.len(), 1);
		assert_eq!(field.types[0].name, "String");
		assert_eq!(field.types[0].value.as_deref(), Some(value));
		assert_eq!(field.direction, FieldDirection::Bidirectional);
		assert_eq!(field.source, FieldSource::User);
	}

	// Fields carry their own source locations.
	assert_ne!(
		structure.fields["a"].span.start.line,
		structure.fields["b"].span.start.line
	);

	assert_eq!(parsed.global.len(), 1);
	assert_eq!(parsed.global[0].kind, RoutineKind::Procedure);
	assert_eq!(parsed.global[0].name, "mypro");
	assert_eq!(parsed.global[0].display, "myPro");
	assert_eq!(parsed.global[0].file, path);

	assert_eq!(
		parsed.compile.pro.get("mypro").unwrap(),
		&vec!["strict".to_string()]
	);
	assert!(parsed.compile.main.is_empty());
}

#[test]
fn user_definition_shadows_builtin_until_removed() {
	let index = WorkspaceIndex::default();
	let path = Path::new("shadow.strand");

	assert_eq!(
		index.lookup_global("count").unwrap().source,
		SymbolSource::Builtin
	);

	index
		.get_parsed(
			path,
			Some("function count, v\n  return, 1\nend"),
			&CancellationToken::new(),
			ParseOptions::default(),
		)
		.unwrap();

	let shadowed = index.lookup_global("count").unwrap();
	assert_eq!(shadowed.source, SymbolSource::User);
	assert_eq!(shadowed.file, path);

	index.remove_file(path);

	assert_eq!(
		index.lookup_global("count").unwrap().source,
		SymbolSource::Builtin
	);
	assert!(index.files().is_empty());
}

#[test]
fn bad_file_does_not_poison_the_aggregate() {
	let index = WorkspaceIndex::default();

	index
		.get_parsed(
			Path::new("good.strand"),
			Some("pro fine\nend"),
			&CancellationToken::new(),
			ParseOptions::default(),
		)
		.unwrap();

	// A file that is pure garbage still parses into diagnostics.
	let broken = index
		.get_parsed(
			Path::new("bad.strand"),
			Some("@@@ ??? = = = {"),
			&CancellationToken::new(),
			ParseOptions::default(),
		)
		.unwrap();

	assert!(broken.problems().count() > 0);
	assert!(index.lookup_global("fine").is_some());

	// A missing file surfaces as a distinct resource error.
	let missing = index.get_parsed(
		Path::new("/no/such/dir/missing.strand"),
		None,
		&CancellationToken::new(),
		ParseOptions::default(),
	);

	assert!(matches!(missing, Err(Error::NotFound(_))));
	assert!(index.lookup_global("fine").is_some());
}

#[test]
fn workspace_indexing_walks_and_merges() {
	logging();

	let root = std::env::temp_dir().join(format!("strand-ls-test-{}", std::process::id()));
	let _ = std::fs::remove_dir_all(&root);
	std::fs::create_dir_all(root.join("sub")).unwrap();

	std::fs::write(root.join("first.strand"), "pro first_routine\nend\n").unwrap();
	std::fs::write(
		root.join("sub/second.strand"),
		"function second_routine, a\n  return, a\nend\n",
	)
	.unwrap();
	std::fs::write(root.join("notes.txt"), "not source\n").unwrap();

	let index = WorkspaceIndex::default();
	let count = index
		.index_workspace(&root, &CancellationToken::new())
		.unwrap();

	assert_eq!(count, 2);
	assert_eq!(index.files().len(), 2);
	assert!(index.lookup_global("first_routine").is_some());
	assert!(index.lookup_global("second_routine").is_some());

	let cancelled = CancellationToken::new();
	cancelled.cancel();

	assert!(matches!(
		index.index_workspace(&root, &cancelled),
		Err(Error::Canceled)
	));

	std::fs::remove_dir_all(&root).unwrap();
}
