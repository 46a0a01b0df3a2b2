//! File watcher: debounced add/change/remove events over a directory
//! tree with an ignore list.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcherTrait};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::ContextMateError;
use crate::logging::*;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// A single collapsed filesystem event, root-relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
	Added(String),
	Changed(String),
	Removed(String),
}

impl FileEvent {
	pub fn path(&self) -> &str {
		match self {
			FileEvent::Added(p) | FileEvent::Changed(p) | FileEvent::Removed(p) => p,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
	AddOrChange,
	Remove,
}

/// Ignore predicate: dotfiles, `node_modules`, `*.conflict.md`/`*.conflict`,
/// plus any caller-supplied gitignore-style patterns, matched with the
/// same builtin-set-plus-overrides approach as a `.gitignore` file.
pub struct IgnorePredicate {
	matcher: Gitignore,
}

impl IgnorePredicate {
	pub fn new(root: &Path, extra_patterns: &[String]) -> Result<Self, ContextMateError> {
		let mut builder = GitignoreBuilder::new(root);
		for pattern in
			[".*", "node_modules", "node_modules/**", "*.conflict.md", "*.conflict"].iter()
		{
			builder.add_line(None, pattern).map_err(|e| ContextMateError::Internal {
				message: format!("bad builtin ignore pattern {}: {}", pattern, e),
			})?;
		}
		for pattern in extra_patterns {
			builder.add_line(None, pattern).map_err(|e| ContextMateError::Internal {
				message: format!("bad ignore pattern {}: {}", pattern, e),
			})?;
		}
		let matcher = builder
			.build()
			.map_err(|e| ContextMateError::Internal { message: e.to_string() })?;
		Ok(IgnorePredicate { matcher })
	}

	pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
		self.matcher.matched(rel_path, is_dir).is_ignore()
	}
}

/// Debounced recursive file watcher.
pub struct FileWatcher {
	root: PathBuf,
	debounce: Duration,
	ignore: Arc<IgnorePredicate>,
	_inner: Option<RecommendedWatcher>,
	stopped: Arc<Mutex<bool>>,
	ready_rx: watch::Receiver<bool>,
}

impl FileWatcher {
	/// Start watching `root`. Returns the watcher plus the receiving half of
	/// the event channel.
	pub fn start(
		root: PathBuf,
		debounce: Duration,
		ignore: IgnorePredicate,
	) -> Result<(Self, mpsc::UnboundedReceiver<FileEvent>), ContextMateError> {
		let ignore = Arc::new(ignore);
		let (event_tx, event_rx) = mpsc::unbounded_channel::<FileEvent>();
		let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<(PathBuf, RawKind)>();
		let (ready_tx, ready_rx) = watch::channel(false);
		let stopped = Arc::new(Mutex::new(false));

		let root_for_watcher = root.clone();
		let mut inner = RecommendedWatcher::new(
			move |res: notify::Result<notify::Event>| {
				if let Ok(event) = res {
					let kind = match event.kind {
						notify::EventKind::Remove(_) => RawKind::Remove,
						notify::EventKind::Create(_) | notify::EventKind::Modify(_) => {
							RawKind::AddOrChange
						}
						_ => return,
					};
					for path in event.paths {
						let _ = raw_tx.send((path, kind));
					}
				}
			},
			notify::Config::default(),
		)
		.map_err(|e| ContextMateError::Internal { message: e.to_string() })?;

		inner
			.watch(&root, RecursiveMode::Recursive)
			.map_err(|e| ContextMateError::Internal { message: e.to_string() })?;

		let debounce_root = root.clone();
		let debounce_ignore = ignore.clone();
		let debounce_stopped = stopped.clone();
		let debounce_window = debounce;
		tokio::spawn(async move {
			let mut pending: HashMap<PathBuf, (RawKind, Instant)> = HashMap::new();
			let mut tick = tokio::time::interval(Duration::from_millis(25));
			let _ = ready_tx.send(true);
			loop {
				if *debounce_stopped.lock().await {
					return;
				}
				tokio::select! {
					maybe = raw_rx.recv() => {
						match maybe {
							Some((path, kind)) => {
								pending.insert(path, (kind, Instant::now()));
							}
							None => return,
						}
					}
					_ = tick.tick() => {
						let now = Instant::now();
						let ready: Vec<PathBuf> = pending
							.iter()
							.filter(|(_, (_, seen))| now.duration_since(*seen) >= debounce_window)
							.map(|(p, _)| p.clone())
							.collect();
						for path in ready {
							if let Some((kind, _)) = pending.remove(&path) {
								if let Ok(rel) = path.strip_prefix(&debounce_root) {
									let rel_str = rel.to_string_lossy().replace('\\', "/");
									if rel_str.is_empty() {
										continue;
									}
									let is_dir = path.is_dir();
									if debounce_ignore.is_ignored(&rel_str, is_dir) {
										continue;
									}
									let event = match kind {
										RawKind::Remove => FileEvent::Removed(rel_str),
										RawKind::AddOrChange => {
											if path.exists() {
												FileEvent::Changed(rel_str)
											} else {
												continue;
											}
										}
									};
									if event_tx.send(event).is_err() {
										return;
									}
								}
							}
						}
					}
				}
			}
		});

		info!(root = %root.display(), "file watcher started");

		Ok((
			FileWatcher { root, debounce, ignore, _inner: Some(inner), stopped, ready_rx },
			event_rx,
		))
	}

	/// Resolves once initial traversal is ready to emit events. In practice
	/// this fires as soon as the debounce loop task is scheduled; `notify`
	/// itself has no separate "initial scan" phase in recursive mode.
	pub async fn ready(&mut self) {
		let _ = self.ready_rx.changed().await;
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn debounce(&self) -> Duration {
		self.debounce
	}

	pub fn ignore(&self) -> &IgnorePredicate {
		&self.ignore
	}

	/// Stop watching. Idempotent: pending (not-yet-debounced) events are
	/// discarded, not flushed.
	pub async fn stop(&mut self) {
		*self.stopped.lock().await = true;
		self._inner = None;
	}
}


// vim: ts=4
