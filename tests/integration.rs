use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use walkdir::WalkDir;

fn mirror_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("mirror");
    path
}

const BROKEN_PAGE: &[u8] = &[0x3c, 0x70, 0x3e, 0xff, 0xfe, 0x3c, 0x2f, 0x70, 0x3e];

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let source = root.join("source");
    for dir in ["works", "authors", "css", "images"] {
        fs::create_dir_all(source.join(dir)).unwrap();
    }

    fs::write(
        source.join("index.htm"),
        r#"<!DOCTYPE html><html><head><title>Stories</title></head><body>
<div class="site-slogan">Old slogan</div>
<div class="t3-content">
<article><img src="images/a.jpg"><p>Teaser</p><p class="readmore"><a href="works/7.html">More</a></p></article>
</div>
<div class="copyright"><div class="custom">(c) site</div></div>
</body></html>"#,
    )
    .unwrap();
    fs::write(
        source.join("works/7.html"),
        r#"<!DOCTYPE html><html><head><title>Site | Seven</title></head><body>
<dd class="createdby">Ann</dd>
<p>The seventh story.</p>
<iframe src="https://player.example/embed/track-1"></iframe>
<div class="kmt-empty-comment">No comments yet</div><ul class="kmt-list"></ul>
<form class="commentForm"><input name="text"></form>
</body></html>"#,
    )
    .unwrap();
    fs::write(
        source.join("works/42.html"),
        r#"<!DOCTYPE html><html><head><title>Site | 42</title></head><body>
<p>The forty-second story.</p>
<iframe src="https://player.example/embed/track-99"></iframe>
<div class="kmt-empty-comment">No comments yet</div><ul class="kmt-list"></ul>
</body></html>"#,
    )
    .unwrap();
    fs::write(
        source.join("authors/ann.html"),
        r#"<html><head><title>Ann</title></head><body>
<ul class="author-works" data-author="Ann"><li><a href="../works/7.html">Seven</a></li></ul>
</body></html>"#,
    )
    .unwrap();
    fs::write(source.join("broken.html"), BROKEN_PAGE).unwrap();
    fs::write(source.join("css/template.css"), "body{background:url(http://dead.cdn/bg.png)}").unwrap();
    fs::write(source.join("images/a.jpg"), [0xffu8, 0xd8, 0xff, 0xe0]).unwrap();

    let external = root.join("external");
    fs::create_dir_all(&external).unwrap();
    fs::write(
        external.join("comments.json"),
        r#"[
  {"thread": "7", "author": "A", "t": 100, "body": "hi"},
  {"thread": "7", "author": "B", "t": 50, "body": "first"}
]"#,
    )
    .unwrap();
    fs::write(
        external.join("music.json"),
        r#"{"track-1": {"url": "https://music.example/t/1", "title": "Rain"}}"#,
    )
    .unwrap();
    fs::write(
        external.join("articles.json"),
        r#"[
  {"id": "7", "title": "Seven", "author": "Ann", "author_age": 17, "tags": ["story"]},
  {"id": "12", "title": "Twelve", "author": "Ann"}
]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[paths]
source_root = "{root}/source"
output_root = "{root}/site"

[datasets]
comments = "{root}/external/comments.json"
music = "{root}/external/music.json"
articles = "{root}/external/articles.json"

[ui]
slogan = "Archive of stories"
archive_note = "Offline copy"

[[assets.css_patches]]
path = "css/template.css"
find = "http://dead.cdn/bg.png"
replace = "../images/bg.png"
"#,
        root = root.display()
    );

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("mirror.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_mirror(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = mirror_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run mirror binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().to_string();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

/// Value printed after `label` in the run summary.
fn summary_value<'a>(stdout: &'a str, label: &str) -> Option<&'a str> {
    stdout
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix(label))
        .map(str::trim)
}

fn site(tmp: &TempDir, rel: &str) -> String {
    fs::read_to_string(tmp.path().join("site").join(rel)).unwrap()
}

#[test]
fn test_run_restores_mirror() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_mirror(&config_path, &["run", "--progress", "off"]);
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);
    assert_eq!(summary_value(&stdout, "Documents:"), Some("5"));
    assert_eq!(summary_value(&stdout, "Failed:"), Some("1"));
    assert!(stdout.contains("broken.html"));

    let seven = site(&tmp, "works/7.html");
    let b = seven.find(r#"mirror-comment-author">B<"#).expect("B restored");
    let a = seven.find(r#"mirror-comment-author">A<"#).expect("A restored");
    assert!(b < a, "comments out of order");
    assert!(!seven.contains("kmt-empty-comment"));
    assert!(!seven.contains("commentForm"));
    assert!(seven.contains("https://music.example/t/1"));
    assert!(seven.contains("approx. 17 y.o."));
    assert!(seven.contains(r#"href="../assets/mirror-dark.css""#));

    let ann = site(&tmp, "authors/ann.html");
    assert!(ann.contains(r#"href="../works/12.html""#));
    assert_eq!(ann.matches("works/7.html").count(), 1);

    let index = site(&tmp, "index.htm");
    assert!(index.contains("Archive of stories"));
    assert!(index.contains("Offline copy"));
    assert!(index.contains("mirror-image-link"));
    assert!(index.contains(r#"<img src="images/a.jpg"></a>"#));
}

#[test]
fn test_unmatched_pages_left_as_scraped() {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_mirror(&config_path, &["run", "--progress", "off"]);
    assert!(success, "run failed: {}", stderr);

    let page = site(&tmp, "works/42.html");
    assert!(page.contains(r#"<div class="kmt-empty-comment">No comments yet</div><ul class="kmt-list"></ul>"#));
    assert!(page.contains(r#"<iframe src="https://player.example/embed/track-99"></iframe>"#));
    assert!(!page.contains("data-mirror-track"));
}

#[test]
fn test_malformed_page_copied_verbatim() {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_mirror(&config_path, &["run", "--progress", "off"]);
    assert!(success, "run failed: {}", stderr);

    let copied = fs::read(tmp.path().join("site/broken.html")).unwrap();
    assert_eq!(copied, BROKEN_PAGE);
}

#[test]
fn test_search_index_in_discovery_order() {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_mirror(&config_path, &["run", "--progress", "off"]);
    assert!(success, "run failed: {}", stderr);

    let index: serde_json::Value = serde_json::from_str(&site(&tmp, "search-index.json")).unwrap();
    assert_eq!(index["version"], 1);
    let paths: Vec<&str> = index["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert_eq!(
        paths,
        vec!["authors/ann.html", "index.htm", "works/42.html", "works/7.html"]
    );
    let seven = &index["entries"][3];
    assert_eq!(seven["id"], "7");
    assert_eq!(seven["title"], "Seven");
    assert_eq!(seven["author"], "Ann");
    assert_eq!(seven["tags"][0], "story");
}

#[test]
fn test_assets_copied_and_patched() {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_mirror(&config_path, &["run", "--progress", "off"]);
    assert!(success, "run failed: {}", stderr);

    assert_eq!(
        fs::read(tmp.path().join("site/images/a.jpg")).unwrap(),
        vec![0xffu8, 0xd8, 0xff, 0xe0]
    );
    assert_eq!(
        site(&tmp, "css/template.css"),
        "body{background:url(../images/bg.png)}"
    );
}

#[test]
fn test_rerun_is_deterministic() {
    let (tmp, config_path) = setup_test_env();

    let (first_out, stderr, success) = run_mirror(&config_path, &["run", "--progress", "off"]);
    assert!(success, "first run failed: {}", stderr);
    let first = read_tree(&tmp.path().join("site"));

    let (second_out, stderr, success) = run_mirror(&config_path, &["run", "--progress", "off"]);
    assert!(success, "second run failed: {}", stderr);
    let second = read_tree(&tmp.path().join("site"));

    assert_eq!(first, second);
    let digest = |s: &str| {
        s.lines()
            .find(|l| l.contains("Output digest:"))
            .map(|l| l.to_string())
    };
    assert!(digest(&first_out).is_some());
    assert_eq!(digest(&first_out), digest(&second_out));
}

#[test]
fn test_report_json() {
    let (tmp, config_path) = setup_test_env();
    let report_path = tmp.path().join("reports/run.json");

    let (_, stderr, success) = run_mirror(
        &config_path,
        &["run", "--progress", "off", "--report", report_path.to_str().unwrap()],
    );
    assert!(success, "run failed: {}", stderr);

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report["total"], 5);
    assert_eq!(report["succeeded"], 4);
    assert_eq!(report["partially_failed"], 0);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["failures"][0]["path"], "broken.html");
    assert_eq!(report["failures"][0]["stage"], "parse");
}

#[test]
fn test_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) =
        run_mirror(&config_path, &["run", "--dry-run", "--progress", "off"]);
    assert!(success, "dry run failed: {}", stderr);
    assert!(stdout.contains("nothing was written"));
    assert!(!tmp.path().join("site").exists());
}

#[test]
fn test_stage_subset() {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_mirror(
        &config_path,
        &["run", "--stages", "comments", "--progress", "off"],
    );
    assert!(success, "run failed: {}", stderr);

    let seven = site(&tmp, "works/7.html");
    assert!(seven.contains("mirror-comment"));
    assert!(!seven.contains("data-mirror-theme"));
    assert!(seven.contains("commentForm"));
}

#[test]
fn test_unknown_stage_rejected() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_mirror(&config_path, &["run", "--stages", "confetti"]);
    assert!(!success);
    assert!(stderr.contains("confetti"));
}

#[test]
fn test_missing_dataset_is_fatal() {
    let (tmp, config_path) = setup_test_env();
    fs::remove_file(tmp.path().join("external/music.json")).unwrap();

    let (_, stderr, success) = run_mirror(&config_path, &["run", "--progress", "off"]);
    assert!(!success, "run should fail without the music dataset");
    assert!(stderr.contains("music"));
    assert!(!tmp.path().join("site").exists());
}

#[test]
fn test_missing_source_root_is_fatal() {
    let (tmp, config_path) = setup_test_env();
    fs::remove_dir_all(tmp.path().join("source")).unwrap();

    let (_, stderr, success) = run_mirror(&config_path, &["run", "--progress", "off"]);
    assert!(!success);
    assert!(stderr.contains("Source root does not exist"));
}

#[test]
fn test_pages_lists_in_order() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_mirror(&config_path, &["pages"]);
    assert!(success, "pages failed: {}", stderr);
    let pages: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        pages,
        vec![
            "authors/ann.html",
            "broken.html",
            "index.htm",
            "works/42.html",
            "works/7.html"
        ]
    );
}

#[test]
fn test_datasets_and_stages_listing() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_mirror(&config_path, &["datasets"]);
    assert!(success, "datasets failed: {}", stderr);
    assert!(stdout.contains("1 threads, 2 comments"));
    assert!(stdout.contains("1 tracks"));
    assert!(stdout.contains("2 works, 1 authors"));

    let (stdout, stderr, success) = run_mirror(&config_path, &["stages"]);
    assert!(success, "stages failed: {}", stderr);
    let names: Vec<&str> = stdout
        .lines()
        .skip(1)
        .filter_map(|l| l.split_whitespace().nth(1))
        .collect();
    assert_eq!(names, vec!["dark_theme", "comments", "music", "age", "ads", "ui"]);
}
