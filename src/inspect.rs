//! Read-only views used to check a configuration before a run:
//! `mirror pages`, `mirror datasets` and `mirror stages`.

use anyhow::Result;

use crate::config::Config;
use crate::datasets::{ArticleMetadata, CommentsArchive, MusicCatalogue};
use crate::discovery::PageDiscovery;
use crate::stages::builtin_stages;

/// Print every page the next run would process, in processing order.
pub fn list_pages(config: &Config) -> Result<()> {
    let discovery = PageDiscovery::from_config(config)?;
    let mut count = 0usize;
    for page in discovery.iter() {
        println!("{}", page?.relative);
        count += 1;
    }
    eprintln!("{} pages", count);
    Ok(())
}

/// Load each dataset and print its size, or why it failed to load.
///
/// Unlike a run, a broken dataset is reported rather than returned as an
/// error, so all three are checked in one go.
pub fn list_datasets(config: &Config) -> Result<()> {
    let ds = &config.datasets;
    println!("{:<12} {:<8} {:<40} DETAILS", "DATASET", "STATUS", "PATH");

    let comments = match CommentsArchive::load(&ds.comments) {
        Ok(a) => (
            "OK",
            format!(
                "{} threads, {} comments, {} dropped",
                a.thread_count(),
                a.comment_count(),
                a.dropped()
            ),
        ),
        Err(e) => ("ERROR", e.to_string()),
    };
    print_row("comments", &ds.comments.display().to_string(), comments);

    let music = match MusicCatalogue::load(&ds.music) {
        Ok(m) => ("OK", format!("{} tracks", m.len())),
        Err(e) => ("ERROR", e.to_string()),
    };
    print_row("music", &ds.music.display().to_string(), music);

    let articles = match ArticleMetadata::load(&ds.articles) {
        Ok(a) => (
            "OK",
            format!("{} works, {} authors", a.len(), a.author_count()),
        ),
        Err(e) => ("ERROR", e.to_string()),
    };
    print_row("articles", &ds.articles.display().to_string(), articles);

    if let Some(css) = &ds.comments_css {
        let status = if css.exists() {
            ("OK", "comment stylesheet".to_string())
        } else {
            ("ERROR", "file not found".to_string())
        };
        print_row("comments_css", &css.display().to_string(), status);
    }

    Ok(())
}

fn print_row(name: &str, path: &str, (status, details): (&str, String)) {
    println!("{:<12} {:<8} {:<40} {}", name, status, path, details);
}

/// Print the stage registry in execution order with enablement.
pub fn list_stages(config: &Config) -> Result<()> {
    println!("{:<4} {:<12} {:<9} DESCRIPTION", "#", "STAGE", "ENABLED");
    for (i, stage) in builtin_stages(config).iter().enumerate() {
        println!(
            "{:<4} {:<12} {:<9} {}",
            i + 1,
            stage.name(),
            if config.stage_enabled(stage.name()) { "yes" } else { "no" },
            stage.description()
        );
    }
    Ok(())
}
