use std::{process, sync::Arc};

use folio::{
    application::{
        blog::BlogService,
        error::AppError,
        fetcher::ContentFetcher,
        lister::ContentLister,
        processor::PostProcessor,
        remote::ContentTransport,
        render::{ComrakRenderer, highlight_css},
        sitemap::SitemapService,
    },
    cache::{CacheConfig, CacheStore, Clock, FsBackend, SystemClock},
    config,
    infra::{error::InfraError, github::GitHubTransport, telemetry},
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

const SOURCE: &str = "folio::main";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Posts(config::PostsArgs::default()));

    telemetry::init(&settings.logging)?;

    if let config::Command::Css(args) = &command {
        let css = highlight_css(&args.theme).map_err(|err| AppError::unexpected(err.to_string()))?;
        print!("{css}");
        return Ok(());
    }

    let blog = build_blog_service(&settings).await?;

    match command {
        config::Command::Posts(args) => {
            let posts = blog.fetch_blog_posts().await?;
            if args.summary {
                let summaries: Vec<_> = posts.iter().map(|post| post.summary()).collect();
                print_json(&summaries)
            } else {
                print_json(&posts)
            }
        }
        config::Command::Sitemap => {
            let posts = blog.fetch_blog_posts().await?;
            let sitemap = SitemapService::new(settings.site.base_url.as_str());
            print!("{}", sitemap.sitemap_xml(&posts, OffsetDateTime::now_utc()));
            Ok(())
        }
        config::Command::Robots => {
            let sitemap = SitemapService::new(settings.site.base_url.as_str());
            print!("{}", sitemap.robots_txt());
            Ok(())
        }
        config::Command::Stats => {
            let posts = blog.fetch_blog_posts().await?;
            info!(target = SOURCE, posts = posts.len(), "collection ready");
            print_json(&blog.cache_stats())
        }
        config::Command::Invalidate => {
            blog.invalidate_cache().await;
            Ok(())
        }
        config::Command::Css(_) => Ok(()),
    }
}

async fn build_blog_service(settings: &config::Settings) -> Result<BlogService, AppError> {
    let directory = settings.cache.directory.clone();
    tokio::fs::create_dir_all(&directory)
        .await
        .map_err(|source| InfraError::CacheDirectory {
            path: directory.clone(),
            source,
        })?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(CacheStore::new(
        CacheConfig::from(&settings.cache),
        Arc::new(FsBackend::new(directory)),
        clock.clone(),
    ));

    let transport: Arc<dyn ContentTransport> =
        Arc::new(GitHubTransport::new(&settings.source, &settings.http)?);
    let renderer =
        ComrakRenderer::new().map_err(|err| AppError::unexpected(err.to_string()))?;

    let lister = ContentLister::new(transport.clone(), cache.clone(), clock.clone());
    let fetcher = ContentFetcher::new(transport, cache.clone());
    let processor = PostProcessor::new(Arc::new(renderer), clock)
        .with_excerpt_length(settings.pipeline.excerpt_length.get())
        .with_words_per_minute(settings.pipeline.words_per_minute.get());

    info!(
        target = SOURCE,
        owner = %settings.source.owner,
        repo = %settings.source.repo,
        branch = %settings.source.branch,
        path = %settings.source.path,
        authenticated = settings.source.token.is_some(),
        cache_dir = %settings.cache.directory.display(),
        "pipeline configured"
    );

    let mut blog = BlogService::new(lister, fetcher, processor, cache);
    if let Some(max) = settings.pipeline.max_concurrency {
        blog = blog.with_max_concurrency(max.get());
    }
    Ok(blog)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
