//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const DEFAULT_OWNER: &str = "gradientesur";
const DEFAULT_REPO: &str = "blog";
const DEFAULT_BRANCH: &str = "main";
const DEFAULT_POSTS_PATH: &str = "blogposts";
const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CACHE_DIR: &str = ".cache/blog";
const DEFAULT_MEMORY_CAPACITY: u64 = 100;
const DEFAULT_MEMORY_TTL_SECS: u64 = 600;
const DEFAULT_DISK_TTL_SECS: u64 = 86_400;
const DEFAULT_EXCERPT_LENGTH: u64 = 160;
const DEFAULT_WORDS_PER_MINUTE: u64 = 200;
const DEFAULT_SITE_URL: &str = "https://blog.gradientesur.com";
pub(crate) const DEFAULT_HIGHLIGHT_THEME: &str = "InspiredGitHub";

/// Command-line arguments for the folio binary.
#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "Blog content pipeline")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Fetch every valid post and print it as JSON.
    Posts(PostsArgs),
    /// Print sitemap.xml for the current post collection.
    Sitemap,
    /// Print robots.txt.
    Robots,
    /// Fetch posts, then print cache statistics as JSON.
    Stats,
    /// Drop every cached entry in both tiers.
    Invalidate,
    /// Print the stylesheet for highlighted code blocks.
    Css(CssArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct PostsArgs {
    /// Print summaries without rendered content.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub summary: bool,
}

#[derive(Debug, Args, Clone)]
pub struct CssArgs {
    /// Syntect theme name.
    #[arg(long, default_value = DEFAULT_HIGHLIGHT_THEME)]
    pub theme: String,
}

/// Overrides accepted on the command line. The `GITHUB_*` variables are the
/// names the content repository has always been configured with.
#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the repository owner.
    #[arg(long = "source-owner", env = "GITHUB_REPO_OWNER", value_name = "OWNER")]
    pub source_owner: Option<String>,

    /// Override the repository name.
    #[arg(long = "source-repo", env = "GITHUB_REPO_NAME", value_name = "REPO")]
    pub source_repo: Option<String>,

    /// Override the branch posts are read from.
    #[arg(long = "source-branch", env = "GITHUB_BRANCH", value_name = "BRANCH")]
    pub source_branch: Option<String>,

    /// Override the directory holding the markdown posts.
    #[arg(long = "source-path", env = "GITHUB_POSTS_PATH", value_name = "PATH")]
    pub source_path: Option<String>,

    /// Access token; raises the upstream rate-limit ceiling.
    #[arg(
        long = "source-token",
        env = "GITHUB_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true
    )]
    pub source_token: Option<String>,

    /// Override the durable cache directory.
    #[arg(long = "cache-directory", value_name = "PATH")]
    pub cache_directory: Option<PathBuf>,

    /// Override the upper bound on concurrent file fetches.
    #[arg(long = "pipeline-max-concurrency", value_name = "COUNT")]
    pub pipeline_max_concurrency: Option<u64>,

    /// Override the public site URL used in the sitemap.
    #[arg(long = "site-base-url", value_name = "URL")]
    pub site_base_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: SourceSettings,
    pub http: HttpSettings,
    pub cache: CacheSettings,
    pub pipeline: PipelineSettings,
    pub site: SiteSettings,
    pub logging: LoggingSettings,
}

#[derive(Clone)]
pub struct SourceSettings {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub path: String,
    pub token: Option<String>,
    pub api_base: Url,
}

impl std::fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSettings")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("path", &self.path)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base.as_str())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub memory_capacity: NonZeroUsize,
    pub memory_ttl: Duration,
    pub disk_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Optional cap on parallel downloads; the remaining rate-limit budget
    /// always applies.
    pub max_concurrency: Option<NonZeroUsize>,
    pub excerpt_length: NonZeroUsize,
    pub words_per_minute: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub base_url: Url,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FOLIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    source: RawSourceSettings,
    http: RawHttpSettings,
    cache: RawCacheSettings,
    pipeline: RawPipelineSettings,
    site: RawSiteSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(owner) = overrides.source_owner.as_ref() {
            self.source.owner = Some(owner.clone());
        }
        if let Some(repo) = overrides.source_repo.as_ref() {
            self.source.repo = Some(repo.clone());
        }
        if let Some(branch) = overrides.source_branch.as_ref() {
            self.source.branch = Some(branch.clone());
        }
        if let Some(path) = overrides.source_path.as_ref() {
            self.source.path = Some(path.clone());
        }
        if let Some(token) = overrides.source_token.as_ref() {
            self.source.token = Some(token.clone());
        }
        if let Some(directory) = overrides.cache_directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
        if let Some(max) = overrides.pipeline_max_concurrency {
            self.pipeline.max_concurrency = Some(max);
        }
        if let Some(url) = overrides.site_base_url.as_ref() {
            self.site.base_url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            source,
            http,
            cache,
            pipeline,
            site,
            logging,
        } = raw;

        Ok(Self {
            source: build_source_settings(source)?,
            http: build_http_settings(http)?,
            cache: build_cache_settings(cache)?,
            pipeline: build_pipeline_settings(pipeline)?,
            site: build_site_settings(site)?,
            logging: build_logging_settings(logging)?,
        })
    }
}

fn build_source_settings(source: RawSourceSettings) -> Result<SourceSettings, LoadError> {
    let owner = required_text(source.owner, DEFAULT_OWNER, "source.owner")?;
    let repo = required_text(source.repo, DEFAULT_REPO, "source.repo")?;
    let branch = required_text(source.branch, DEFAULT_BRANCH, "source.branch")?;
    let path = source
        .path
        .map(|value| value.trim().trim_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_POSTS_PATH.to_string());
    let token = source.token.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    let api_base = parse_url(
        source.api_base.as_deref().unwrap_or(DEFAULT_API_BASE),
        "source.api_base",
    )?;

    Ok(SourceSettings {
        owner,
        repo,
        branch,
        path,
        token,
        api_base,
    })
}

fn build_http_settings(http: RawHttpSettings) -> Result<HttpSettings, LoadError> {
    let timeout = seconds(
        http.timeout_seconds.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        "http.timeout_seconds",
    )?;
    let user_agent = http
        .user_agent
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default_user_agent().to_string());

    Ok(HttpSettings {
        timeout,
        user_agent,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let directory = cache
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.directory",
            "path must not be empty",
        ));
    }

    let memory_capacity = non_zero_usize(
        cache.memory_capacity.unwrap_or(DEFAULT_MEMORY_CAPACITY),
        "cache.memory_capacity",
    )?;
    let memory_ttl = seconds(
        cache.memory_ttl_seconds.unwrap_or(DEFAULT_MEMORY_TTL_SECS),
        "cache.memory_ttl_seconds",
    )?;
    let disk_ttl = seconds(
        cache.disk_ttl_seconds.unwrap_or(DEFAULT_DISK_TTL_SECS),
        "cache.disk_ttl_seconds",
    )?;

    Ok(CacheSettings {
        directory,
        memory_capacity,
        memory_ttl,
        disk_ttl,
    })
}

fn build_pipeline_settings(pipeline: RawPipelineSettings) -> Result<PipelineSettings, LoadError> {
    let max_concurrency = pipeline
        .max_concurrency
        .map(|value| non_zero_usize(value, "pipeline.max_concurrency"))
        .transpose()?;
    let excerpt_length = non_zero_usize(
        pipeline.excerpt_length.unwrap_or(DEFAULT_EXCERPT_LENGTH),
        "pipeline.excerpt_length",
    )?;
    let words_per_minute = non_zero_u32(
        pipeline
            .words_per_minute
            .unwrap_or(DEFAULT_WORDS_PER_MINUTE),
        "pipeline.words_per_minute",
    )?;

    Ok(PipelineSettings {
        max_concurrency,
        excerpt_length,
        words_per_minute,
    })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let base_url = parse_url(
        site.base_url.as_deref().unwrap_or(DEFAULT_SITE_URL),
        "site.base_url",
    )?;
    Ok(SiteSettings { base_url })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSourceSettings {
    owner: Option<String>,
    repo: Option<String>,
    branch: Option<String>,
    path: Option<String>,
    token: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHttpSettings {
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    directory: Option<PathBuf>,
    memory_capacity: Option<u64>,
    memory_ttl_seconds: Option<u64>,
    disk_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPipelineSettings {
    max_concurrency: Option<u64>,
    excerpt_length: Option<u64>,
    words_per_minute: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

fn default_user_agent() -> &'static str {
    concat!("folio/", env!("CARGO_PKG_VERSION"))
}

fn required_text(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoadError::invalid(key, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn parse_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value.trim())
        .map_err(|err| LoadError::invalid(key, format!("invalid URL `{value}`: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(LoadError::invalid(
            key,
            format!("`{value}` cannot be used as a base URL"),
        ));
    }
    Ok(url)
}

fn seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value_usize: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value_usize).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
