// src/rewrite.rs
//! Social-post rewriting via an external LLM.
//!
//! `Rewriter` is the seam the API handler talks to. The OpenAI
//! implementation is wrapped in `CachingRewriter`: a file cache keyed by the
//! input hash plus a persisted daily call budget, so repeated headlines and
//! restarts don't burn quota.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_DAILY_LIMIT: &str = "REWRITE_DAILY_LIMIT";
pub const ENV_TEST_MODE: &str = "REWRITE_TEST_MODE";
const DEFAULT_DAILY_LIMIT: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("API Key missing")]
    MissingCredentials,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("provider returned no content")]
    EmptyResponse,

    #[error("daily rewrite limit reached")]
    LimitReached,
}

#[async_trait]
pub trait Rewriter: Send + Sync {
    /// Turn a matched headline into social-post copy.
    async fn rewrite(&self, title: &str, summary: &str) -> Result<String, RewriteError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Build the production rewriter stack from the environment.
///
/// * `REWRITE_TEST_MODE=mock` returns a deterministic mock.
/// * Otherwise: OpenAI behind the caching wrapper. A missing API key is
///   reported per call, not at startup, so the rest of the service runs.
pub fn build_rewriter() -> Arc<dyn Rewriter> {
    if std::env::var(ENV_TEST_MODE).map(|v| v == "mock").unwrap_or(false) {
        return Arc::new(MockRewriter {
            fixed: "Mock post (test mode)".to_string(),
        });
    }
    let limit = std::env::var(ENV_DAILY_LIMIT)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(DEFAULT_DAILY_LIMIT);
    Arc::new(CachingRewriter::new(
        OpenAiRewriter::from_env(),
        default_cache_dir(),
        limit,
    ))
}

/// OpenAI provider (Chat Completions API). Requires `OPENAI_API_KEY`.
pub struct OpenAiRewriter {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiRewriter {
    pub fn from_env() -> Self {
        let api_key = std::env::var(ENV_API_KEY).unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("defense-intel-monitor/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[async_trait]
impl Rewriter for OpenAiRewriter {
    async fn rewrite(&self, title: &str, summary: &str) -> Result<String, RewriteError> {
        if self.api_key.is_empty() {
            return Err(RewriteError::MissingCredentials);
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let prompt = format!(
            "Act as a defense analyst. Rewrite this news into a viral LinkedIn/Twitter post. \
             Make it engaging, professional, and exciting. Use bullet points if needed. \
             Include 3 relevant hashtags. \n\n\
             News Title: {title}\n\
             Summary: {summary}"
        );
        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: &prompt,
            }],
            max_tokens: 150,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RewriteError::Status(resp.status()));
        }
        let body: Resp = resp.json().await?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(RewriteError::EmptyResponse);
        }
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Fixed-output mock for tests and local runs.
#[derive(Clone)]
pub struct MockRewriter {
    pub fixed: String,
}

#[async_trait]
impl Rewriter for MockRewriter {
    async fn rewrite(&self, _title: &str, _summary: &str) -> Result<String, RewriteError> {
        Ok(self.fixed.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// File cache + daily limit around any inner rewriter.
///
/// Cache hits do not consume the daily budget; only real provider calls do.
/// Credential errors pass through uncounted as well.
pub struct CachingRewriter<R> {
    inner: R,
    cache_dir: PathBuf,
    daily_limit: u32,
    counter: Mutex<DailyCounter>,
}

impl<R: Rewriter> CachingRewriter<R> {
    pub fn new(inner: R, cache_dir: PathBuf, daily_limit: u32) -> Self {
        let _ = fs::create_dir_all(&cache_dir); // best-effort
        let counter = Mutex::new(load_daily_counter(&cache_dir).unwrap_or_default());
        Self {
            inner,
            cache_dir,
            daily_limit,
            counter,
        }
    }

    async fn rewrite_impl(&self, title: &str, summary: &str) -> Result<String, RewriteError> {
        // 1) Cache lookup.
        let key = cache_key(title, summary);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            return Ok(hit);
        }

        // 2) Daily budget.
        {
            let mut g = self.counter.lock().expect("poisoned counter");
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit {
                return Err(RewriteError::LimitReached);
            }
        }

        // 3) Real call. Only a success consumes the budget.
        let fresh = self.inner.rewrite(title, summary).await?;
        let _ = write_cache_file(&self.cache_dir, &key, &fresh);
        let mut g = self.counter.lock().expect("poisoned counter");
        g.count = g.count.saturating_add(1);
        let _ = save_daily_counter(&self.cache_dir, &g);
        Ok(fresh)
    }
}

#[async_trait]
impl<R: Rewriter> Rewriter for CachingRewriter<R> {
    async fn rewrite(&self, title: &str, summary: &str) -> Result<String, RewriteError> {
        self.rewrite_impl(title, summary).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

// --- file cache helpers ---

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/rewrite")
}

fn cache_key(title: &str, summary: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(summary.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedPost {
    content: String,
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<String> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    let cached: CachedPost = serde_json::from_str(&s).ok()?;
    Some(cached.content)
}

fn write_cache_file(dir: &Path, key: &str, content: &str) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(&CachedPost {
        content: content.to_string(),
    })
    .unwrap_or_else(|_| "{}".to_string());
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// --- daily counter helpers ---

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }

    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    let dc: DailyCounter =
        serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(dc)
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc).unwrap_or_else(|_| "{}".to_string());
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, p)?;
    Ok(())
}
