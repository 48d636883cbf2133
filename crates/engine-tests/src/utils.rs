#![allow(dead_code)]

use async_trait::async_trait;
use engine_core::{
    error::FetchError,
    memory::{MemoryProbe, MemoryReading},
    transport::Transport,
};
use model::{
    core::repository::Repository, execution::quota::QuotaSnapshot, records::outcome::FileContent,
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// What the scripted remote answers for one `owner/name:path`.
#[derive(Debug, Clone)]
pub enum Reply {
    Content(String),
    NotFound,
    Forbidden,
    Transient,
    RateLimited(Option<Duration>),
}

impl Reply {
    fn into_result(self, key: &str) -> Result<FileContent, FetchError> {
        match self {
            Reply::Content(body) => Ok(FileContent::new(body, format!("sha-{key}"))),
            Reply::NotFound => Err(FetchError::NotFound(key.to_string())),
            Reply::Forbidden => Err(FetchError::Forbidden(key.to_string())),
            Reply::Transient => Err(FetchError::Transient("502 bad gateway".into())),
            Reply::RateLimited(retry_after) => Err(FetchError::RateLimited { retry_after }),
        }
    }
}

/// In-process stand-in for a repository host.
///
/// Queued replies are served first; once a key's queue is empty the steady
/// reply applies, defaulting to `NotFound`. Tracks call counts and the peak
/// number of concurrent fetches, overall and per repository.
#[derive(Default)]
pub struct ScriptedTransport {
    steady: HashMap<String, Reply>,
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    quota: Mutex<Option<QuotaSnapshot>>,
    latency: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    per_repo: Mutex<HashMap<String, (usize, usize)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, repo: &str, path: &str, body: &str) -> Self {
        self.steady
            .insert(key(repo, path), Reply::Content(body.to_string()));
        self
    }

    pub fn reply(mut self, repo: &str, path: &str, reply: Reply) -> Self {
        self.steady.insert(key(repo, path), reply);
        self
    }

    /// Replies served, in order, before the steady reply.
    pub fn then(self, repo: &str, path: &str, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(key(repo, path))
            .or_default()
            .extend(replies);
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_quota(&self, quota: QuotaSnapshot) {
        *self.quota.lock().unwrap() = Some(quota);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, repo: &str, path: &str) -> usize {
        let wanted = key(repo, path);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|k| **k == wanted)
            .count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight_for(&self, repo: &str) -> usize {
        self.per_repo
            .lock()
            .unwrap()
            .get(repo)
            .map(|(_, peak)| *peak)
            .unwrap_or(0)
    }

    fn enter(&self, repo: &str) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let mut per_repo = self.per_repo.lock().unwrap();
        let (current, peak) = per_repo.entry(repo.to_string()).or_default();
        *current += 1;
        *peak = (*peak).max(*current);
    }

    fn leave(&self, repo: &str) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some((current, _)) = self.per_repo.lock().unwrap().get_mut(repo) {
            *current -= 1;
        }
    }

    fn next_reply(&self, key: &str) -> Reply {
        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front);
        queued
            .or_else(|| self.steady.get(key).cloned())
            .unwrap_or(Reply::NotFound)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, repo: &Repository, path: &str) -> Result<FileContent, FetchError> {
        let key = key(&repo.full_name, path);
        self.calls.lock().unwrap().push(key.clone());
        self.enter(&repo.full_name);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let reply = self.next_reply(&key);
        self.leave(&repo.full_name);
        reply.into_result(&key)
    }

    fn current_quota(&self) -> Option<QuotaSnapshot> {
        *self.quota.lock().unwrap()
    }
}

fn key(repo: &str, path: &str) -> String {
    format!("{repo}:{path}")
}

/// Memory probe that plays back a script of system usage percentages, then
/// repeats the last one forever.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
    reads: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(percentages: impl IntoIterator<Item = f64>) -> Arc<Self> {
        let script: VecDeque<f64> = percentages.into_iter().collect();
        let last = script.back().copied().unwrap_or(20.0);
        Arc::new(Self {
            script: Mutex::new(script),
            last: Mutex::new(last),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn calm() -> Arc<Self> {
        Self::new([20.0])
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl MemoryProbe for ScriptedProbe {
    fn read(&self) -> MemoryReading {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let percent_used = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| *self.last.lock().unwrap());
        MemoryReading {
            percent_used,
            process_rss_mb: 1.0,
        }
    }
}
