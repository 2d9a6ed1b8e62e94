// tests/integration_test.rs

//! Integration tests for stbpanel
//!
//! Workers run end to end against an in-process HTTP server that serves
//! canned responses.

use stbpanel::convert::{ConvertJob, PlaylistFormat};
use stbpanel::discovery::listing::DirectoryListingJob;
use stbpanel::discovery::repo::{FindByExtension, RepoArchiveJob, RepoKind, RepoSource};
use stbpanel::host::{PackageAction, PackageTool};
use stbpanel::install::bouquets::{BouquetInstallJob, MASTER_TV};
use stbpanel::install::file::{FeedInstallJob, FileInstallJob};
use stbpanel::install::picons::PiconInstallJob;
use stbpanel::reload::NoopReloader;
use stbpanel::worker::{self, CancellationToken, Outcome, TaskOptions};
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

type Hook = Arc<dyn Fn() + Send + Sync>;

struct Route {
    status: u16,
    body: Vec<u8>,
    hook: Option<Hook>,
    /// Announce a longer body than `body`, then go silent
    stall: bool,
}

impl Route {
    fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            hook: None,
            stall: false,
        }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            body: b"not found".to_vec(),
            hook: None,
            stall: false,
        }
    }

    fn with_hook(mut self, hook: Hook) -> Self {
        self.hook = Some(hook);
        self
    }

    fn stalling(body: impl Into<Vec<u8>>) -> Self {
        Self {
            stall: true,
            ..Self::ok(body)
        }
    }
}

/// Serve `routes` on a random local port; returns the base URL
fn serve(routes: HashMap<&'static str, Route>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            handle(stream, &routes);
        }
    });

    format!("http://{}", addr)
}

fn handle(mut stream: TcpStream, routes: &HashMap<&'static str, Route>) {
    let mut request = Vec::new();
    let mut buffer = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buffer) {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buffer[..n]),
        }
    }

    let request = String::from_utf8_lossy(&request);
    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

    let not_found = Route::not_found();
    let route = routes.get(path.as_str()).unwrap_or(&not_found);
    if let Some(hook) = &route.hook {
        hook();
    }

    let length = if route.stall {
        route.body.len() + 1000
    } else {
        route.body.len()
    };
    let header = format!(
        "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        route.status, length
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&route.body);
    let _ = stream.flush();
    if route.stall {
        thread::sleep(Duration::from_secs(30));
    }
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn picon_routes() -> HashMap<&'static str, Route> {
    let mut routes = HashMap::new();
    routes.insert(
        "/picons/one.zip",
        Route::ok(zip_bytes(&[("one/1_0_1.png", b"a"), ("__MACOSX/._1_0_1.png", b"m")])),
    );
    routes.insert("/picons/two.zip", Route::ok(zip_bytes(&[("2_0_1.png", b"b")])));
    routes.insert("/picons/three.zip", Route::ok(zip_bytes(&[("3_0_1.png", b"c")])));
    routes
}

fn picon_ids() -> Vec<String> {
    vec!["one.zip".to_string(), "two.zip".to_string(), "three.zip".to_string()]
}

#[test]
fn test_directory_listing_without_matches_fails() {
    let mut routes = HashMap::new();
    routes.insert("/picons/", Route::ok("<html><a href=\"readme.txt\">readme</a></html>"));
    let base = serve(routes);

    let outcome = worker::start(DirectoryListingJob::new(format!("{}/picons/", base), ".zip"))
        .unwrap()
        .wait();
    match outcome {
        Outcome::Failed(message) => assert!(message.contains("No *.zip files")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_directory_listing() {
    let mut routes = HashMap::new();
    routes.insert(
        "/picons/",
        Route::ok("<a href=\"b.zip\">b</a><a href=\"A.zip\">A</a><a href=\"b.zip\">b</a>"),
    );
    let base = serve(routes);

    let listing = worker::start(DirectoryListingJob::new(format!("{}/picons/", base), ".zip"))
        .unwrap()
        .wait()
        .completed()
        .unwrap();
    let ids: Vec<&str> = listing.ids().collect();
    assert_eq!(ids, vec!["A.zip", "b.zip"]);
}

#[test]
fn test_picon_batch_isolates_failed_item() {
    let mut routes = picon_routes();
    routes.insert("/picons/two.zip", Route::not_found());
    let base = serve(routes);
    let target = tempfile::tempdir().unwrap();

    let job = PiconInstallJob::new(format!("{}/picons/", base), picon_ids(), target.path());
    let summary = worker::start(job).unwrap().wait().completed().unwrap();

    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed_count(), 1);
    assert_eq!(summary.failed[0].name, "two.zip");
    assert!(target.path().join("1_0_1.png").exists());
    assert!(target.path().join("3_0_1.png").exists());
    assert!(!target.path().join("2_0_1.png").exists());
    assert!(!target.path().join("._1_0_1.png").exists());
}

#[test]
fn test_picon_batch_cancelled_after_first_item() {
    let cancel = CancellationToken::new();
    let mut routes = picon_routes();
    let token = cancel.clone();
    let two = zip_bytes(&[("2_0_1.png", b"b")]);
    routes.insert(
        "/picons/two.zip",
        Route::ok(two).with_hook(Arc::new(move || token.cancel())),
    );
    let base = serve(routes);
    let target = tempfile::tempdir().unwrap();

    let job = PiconInstallJob::new(format!("{}/picons/", base), picon_ids(), target.path());
    let options = TaskOptions {
        cancel,
        ..TaskOptions::default()
    };
    let outcome = worker::start_with(job, options).unwrap().wait();

    assert!(outcome.is_cancelled());
    assert!(target.path().join("1_0_1.png").exists());
    assert!(!target.path().join("2_0_1.png").exists());
    assert!(!target.path().join("3_0_1.png").exists());
}

#[test]
fn test_progress_arrives_before_completion() {
    let base = serve(picon_routes());
    let target = tempfile::tempdir().unwrap();

    let job = PiconInstallJob::new(format!("{}/picons/", base), picon_ids(), target.path());
    let mut handle = worker::start(job).unwrap();

    let mut snapshots = Vec::new();
    let outcome = loop {
        if let Some(outcome) = handle.tick(|p| snapshots.push(p.clone())) {
            break outcome;
        }
        thread::sleep(Duration::from_millis(5));
    };

    assert!(outcome.is_completed());
    assert!(!snapshots.is_empty());
    assert!(snapshots.iter().all(|p| p.item.as_ref().is_some_and(|i| i.count == 3)));
    assert!(handle.tick(|_| panic!("no progress after completion")).is_none());
}

fn bouquet_repo() -> Vec<u8> {
    zip_bytes(&[
        ("azmanIPTVsettings-main/userbouquet.azman_news.tv", b"#NAME News\n"),
        ("azmanIPTVsettings-main/radio/userbouquet.azman_music.radio", b"#NAME Music\n"),
        ("azmanIPTVsettings-main/bouquets.tv", b"#NAME Bouquets (TV)\n"),
        ("azmanIPTVsettings-main/README.md", b"readme"),
    ])
}

fn bouquet_source(base: &str) -> RepoSource {
    RepoSource::new(
        RepoKind::Bouquets,
        &format!("{}/repo.zip", base),
        "azmanIPTVsettings-main",
        Box::new(FindByExtension::bouquets()),
    )
}

#[test]
fn test_repo_archive_discovery_and_install() {
    let mut routes = HashMap::new();
    routes.insert("/repo.zip", Route::ok(bouquet_repo()));
    let base = serve(routes);

    let snapshot = worker::start(RepoArchiveJob::new(bouquet_source(&base)))
        .unwrap()
        .wait()
        .completed()
        .unwrap();
    let workdir = snapshot.workdir().to_path_buf();
    let names: Vec<&str> = snapshot.items().iter().map(|i| i.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["bouquets.tv", "userbouquet.azman_music.radio", "userbouquet.azman_news.tv"]
    );

    let channel_dir = tempfile::tempdir().unwrap();
    let selected: Vec<String> = snapshot.items().iter().map(|i| i.id.clone()).collect();
    let job = BouquetInstallJob {
        snapshot,
        selected,
        channel_dir: channel_dir.path().to_path_buf(),
        reloader: Box::new(NoopReloader),
    };
    let summary = worker::start(job).unwrap().wait().completed().unwrap();

    assert_eq!(summary.succeeded(), 3);
    assert!(!workdir.exists());

    let tv = fs::read_to_string(channel_dir.path().join(MASTER_TV)).unwrap();
    assert!(tv.starts_with("#NAME Bouquets (TV)\n"));
    assert_eq!(tv.matches("userbouquet.azman_news.tv").count(), 1);
    let radio = fs::read_to_string(channel_dir.path().join("bouquets.radio")).unwrap();
    assert!(radio.contains("\"userbouquet.azman_music.radio\""));
}

#[test]
fn test_repo_archive_missing_top_dir() {
    let mut routes = HashMap::new();
    routes.insert("/repo.zip", Route::ok(zip_bytes(&[("other-main/a.tv", b"x")])));
    let base = serve(routes);

    match worker::start(RepoArchiveJob::new(bouquet_source(&base))).unwrap().wait() {
        Outcome::Failed(message) => assert!(message.starts_with("Not found")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_repo_archive_traversal_aborts() {
    let mut routes = HashMap::new();
    routes.insert(
        "/repo.zip",
        Route::ok(zip_bytes(&[
            ("azmanIPTVsettings-main/a.tv", b"x"),
            ("../../etc/passwd", b"root"),
        ])),
    );
    let base = serve(routes);

    match worker::start(RepoArchiveJob::new(bouquet_source(&base))).unwrap().wait() {
        Outcome::Failed(message) => assert!(message.contains("../../etc/passwd")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_m3u_conversion_registers_once() {
    let playlist = "#EXTM3U\n#EXTINF:-1 tvg-name=\"Foo\",Foo\nhttp://x/y z\n#EXTINF:-1\nhttp://x/anon\n";
    let mut routes = HashMap::new();
    routes.insert("/pl.m3u", Route::ok(playlist));
    let base = serve(routes);
    let channel_dir = tempfile::tempdir().unwrap();
    let output = channel_dir.path().join("userbouquet.iptvorg_pl.tv");

    for _ in 0..2 {
        let job = ConvertJob::new(
            format!("{}/pl.m3u", base),
            &output,
            "iptv.org m3u PL",
            PlaylistFormat::M3u,
            Box::new(NoopReloader),
        );
        let message = worker::start(job).unwrap().wait().completed().unwrap();
        assert!(message.contains("(2 channels)"));
    }

    let bouquet = fs::read_to_string(&output).unwrap();
    assert_eq!(
        bouquet,
        "#NAME iptv.org m3u PL\n\
         #SERVICE 4097:0:1:0:0:0:0:0:0:0:http%3A%2F%2Fx%2Fy%20z:Foo\n\
         #SERVICE 4097:0:1:0:0:0:0:0:0:0:http%3A%2F%2Fx%2Fanon:Unknown channel\n"
    );

    let master = fs::read_to_string(channel_dir.path().join(MASTER_TV)).unwrap();
    assert_eq!(master.matches("userbouquet.iptvorg_pl.tv").count(), 1);
}

#[test]
fn test_epg_sources_overwrite_existing_file() {
    let mut routes = HashMap::new();
    routes.insert("/sources.xml", Route::ok("<sources>new</sources>"));
    let base = serve(routes);
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("polandAzman.sources.xml");
    fs::write(&target, "<sources>old</sources>").unwrap();

    let job = FileInstallJob::new(format!("{}/sources.xml", base), &target);
    let message = worker::start(job).unwrap().wait().completed().unwrap();

    assert!(message.contains("polandAzman.sources.xml"));
    assert_eq!(fs::read_to_string(&target).unwrap(), "<sources>new</sources>");
    assert!(!dir.path().join("polandAzman.sources.xml.part").exists());
}

#[derive(Default)]
struct CountingTool {
    updates: AtomicUsize,
}

impl PackageTool for CountingTool {
    fn list_installed(&self) -> stbpanel::Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    fn run(&self, _action: PackageAction, _package: &str) -> stbpanel::Result<String> {
        Ok(String::new())
    }

    fn update(&self) -> stbpanel::Result<String> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok("Updated source 'azman-feed'.".to_string())
    }
}

#[test]
fn test_feed_install_runs_update() {
    let mut routes = HashMap::new();
    routes.insert("/azman-feed.conf", Route::ok("src/gz azman-feed https://example.invalid/feed\n"));
    let base = serve(routes);
    let dir = tempfile::tempdir().unwrap();
    let conf = dir.path().join("opkg/azman-feed.conf");
    let tool = Arc::new(CountingTool::default());

    let job = FeedInstallJob::new(format!("{}/azman-feed.conf", base), &conf, tool.clone());
    assert!(worker::start(job).unwrap().wait().is_completed());

    assert_eq!(tool.updates.load(Ordering::SeqCst), 1);
    assert!(fs::read_to_string(&conf).unwrap().starts_with("src/gz azman-feed"));
}

#[test]
fn test_feed_download_failure_skips_update() {
    let base = serve(HashMap::new());
    let dir = tempfile::tempdir().unwrap();
    let tool = Arc::new(CountingTool::default());

    let job = FeedInstallJob::new(
        format!("{}/missing.conf", base),
        dir.path().join("azman-feed.conf"),
        tool.clone(),
    );
    match worker::start(job).unwrap().wait() {
        Outcome::Failed(message) => assert!(message.contains("404")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(tool.updates.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stalled_download_times_out() {
    let mut routes = HashMap::new();
    routes.insert("/sources.xml", Route::stalling("<sources>"));
    let base = serve(routes);
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("polandAzman.sources.xml");

    let mut job = FileInstallJob::new(format!("{}/sources.xml", base), &target);
    job.timeout = Duration::from_secs(1);
    let started = Instant::now();
    let outcome = worker::start(job).unwrap().wait();

    assert!(started.elapsed() < Duration::from_secs(20));
    match outcome {
        Outcome::Failed(message) => assert!(message.starts_with("Download failed")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!target.exists());
    assert!(!dir.path().join("polandAzman.sources.xml.part").exists());
}

fn master_line(name: &str) -> String {
    format!("#SERVICE 1:7:1:0:0:0:0:0:0:0:FROM BOUQUET \"{}\" ORDER BY bouquet\n", name)
}

#[test]
fn test_selected_master_list_keeps_registrations() {
    let repo_master = format!(
        "#NAME Bouquets (TV)\n{}{}",
        master_line("userbouquet.azman_news.tv"),
        master_line("userbouquet.azman_extra.tv")
    );
    let mut routes = HashMap::new();
    routes.insert(
        "/repo.zip",
        Route::ok(zip_bytes(&[
            ("azmanIPTVsettings-main/userbouquet.azman_news.tv", b"#NAME News\n"),
            ("azmanIPTVsettings-main/bouquets.tv", repo_master.as_bytes()),
        ])),
    );
    let base = serve(routes);

    let channel_dir = tempfile::tempdir().unwrap();
    let master = channel_dir.path().join(MASTER_TV);
    fs::write(
        &master,
        format!("#NAME User - bouquets (TV)\n{}", master_line("userbouquet.mine.tv")),
    )
    .unwrap();

    let snapshot = worker::start(RepoArchiveJob::new(bouquet_source(&base)))
        .unwrap()
        .wait()
        .completed()
        .unwrap();
    let id_of = |name: &str| {
        snapshot
            .items()
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.id.clone())
            .unwrap()
    };
    let selected = vec![id_of("userbouquet.azman_news.tv"), id_of(MASTER_TV)];

    let job = BouquetInstallJob {
        snapshot,
        selected,
        channel_dir: channel_dir.path().to_path_buf(),
        reloader: Box::new(NoopReloader),
    };
    let summary = worker::start(job).unwrap().wait().completed().unwrap();
    assert_eq!(summary.succeeded(), 2);

    let tv = fs::read_to_string(&master).unwrap();
    assert!(tv.starts_with("#NAME User - bouquets (TV)\n"));
    assert_eq!(tv.matches("\"userbouquet.mine.tv\"").count(), 1);
    assert_eq!(tv.matches("\"userbouquet.azman_news.tv\"").count(), 1);
    assert_eq!(tv.matches("\"userbouquet.azman_extra.tv\"").count(), 1);
}

#[test]
fn test_repo_archive_member_named_like_download() {
    let mut routes = HashMap::new();
    routes.insert(
        "/repo.zip",
        Route::ok(zip_bytes(&[
            ("repo.zip", b"not the archive"),
            ("repo.zip.part", b"not the archive either"),
            ("azmanIPTVsettings-main/userbouquet.azman_news.tv", b"#NAME News\n"),
        ])),
    );
    let base = serve(routes);

    let snapshot = worker::start(RepoArchiveJob::new(bouquet_source(&base)))
        .unwrap()
        .wait()
        .completed()
        .unwrap();
    let names: Vec<&str> = snapshot.items().iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["userbouquet.azman_news.tv"]);
}

#[test]
fn test_channel_map_conversion() {
    let channel_map = r#"{
        "news": [{"name": "TVN24: Live", "url": "https://www.youtube.com/watch?v=abc"}],
        "music": [{"name": "Radio One", "url": "https://www.youtube.com/watch?v=r 1"}, {"name": "broken"}]
    }"#;
    let mut routes = HashMap::new();
    routes.insert("/channels.json", Route::ok(channel_map));
    let base = serve(routes);
    let channel_dir = tempfile::tempdir().unwrap();
    let output = channel_dir.path().join("userbouquet.yt_pl.tv");

    let job = ConvertJob::new(
        format!("{}/channels.json", base),
        &output,
        "YouTube PL",
        PlaylistFormat::ChannelMap,
        Box::new(NoopReloader),
    );
    let message = worker::start(job).unwrap().wait().completed().unwrap();
    assert!(message.contains("(2 channels)"));

    let bouquet = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = bouquet.lines().collect();
    assert_eq!(lines[0], "#NAME YouTube PL");
    assert!(lines[1].contains("v%3Dr%201:Radio One"));
    assert_eq!(lines[2], "#DESCRIPTION Radio One");
    assert!(lines[3].ends_with(":TVN24- Live"));
    assert_eq!(lines[4], "#DESCRIPTION TVN24- Live");

    let tv = fs::read_to_string(channel_dir.path().join(MASTER_TV)).unwrap();
    assert_eq!(tv.matches("\"userbouquet.yt_pl.tv\"").count(), 1);
}
