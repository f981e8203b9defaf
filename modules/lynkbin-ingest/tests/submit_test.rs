//! End-to-end submissions against fixture collaborators.

use std::sync::Arc;
use std::time::Duration;

use lynkbin_common::{Platform, PostFilter, VocabularyKind};
use lynkbin_ingest::fixtures::{FixtureFetcher, FixtureOracle, FixtureRenderer, MemoryStore};
use lynkbin_ingest::render::RenderedPage;
use lynkbin_ingest::{
    ExtractionError, IngestError, IngestSettings, Ingestor, MediaError, OracleError, StoreError,
    Submission,
};

const REDDIT_URL: &str = "https://www.reddit.com/r/space/comments/abc123/jwst_finds_water/";
const INSTAGRAM_URL: &str = "https://www.instagram.com/p/Cabc123/";

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn reply(category: &str, tags: &[&str]) -> String {
    serde_json::json!({
        "category": category,
        "topic": "A topic",
        "tags": tags,
        "description": "A short description.",
    })
    .to_string()
}

struct Harness {
    renderer: Arc<FixtureRenderer>,
    fetcher: Arc<FixtureFetcher>,
    oracle: Arc<FixtureOracle>,
    store: Arc<MemoryStore>,
    scratch: tempfile::TempDir,
}

impl Harness {
    fn new(renderer: FixtureRenderer, fetcher: FixtureFetcher, oracle: FixtureOracle) -> Self {
        Self::with_store(renderer, fetcher, oracle, MemoryStore::new())
    }

    fn with_store(
        renderer: FixtureRenderer,
        fetcher: FixtureFetcher,
        oracle: FixtureOracle,
        store: MemoryStore,
    ) -> Self {
        Self {
            renderer: Arc::new(renderer),
            fetcher: Arc::new(fetcher),
            oracle: Arc::new(oracle),
            store: Arc::new(store),
            scratch: tempfile::tempdir().unwrap(),
        }
    }

    fn ingestor(&self) -> Ingestor {
        let settings = IngestSettings {
            render_timeout: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(2),
            oracle_timeout: Duration::from_millis(500),
            scratch_root: self.scratch.path().join("downloads"),
            ..Default::default()
        };
        Ingestor::new(
            self.renderer.clone(),
            self.fetcher.clone(),
            self.oracle.clone(),
            self.store.clone(),
            settings,
        )
    }

    /// Scratch scopes left behind under the scratch root.
    fn leftover_scopes(&self) -> usize {
        std::fs::read_dir(self.scratch.path().join("downloads"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

fn reddit_page() -> String {
    r#"<html><head><title>JWST finds water : r/space</title></head><body>
        <shreddit-post author="example" post-title="JWST finds water on a distant exoplanet">
          <div slot="text-body"><p>The spectrum shows a clear absorption line.</p></div>
        </shreddit-post>
    </body></html>"#
        .to_string()
}

fn candidate(url: &str) -> String {
    format!(r#"{{"image_versions2":{{"candidates":[{{"width":1080,"url":"{url}"}}]}}}}"#)
}

fn carousel_payload(urls: &[&str]) -> String {
    let items: Vec<String> = urls.iter().map(|u| candidate(u)).collect();
    format!(
        r#"<html><body><script>{{"product_type":"carousel_container","owner":{{"id":"9","username":"natgeo"}},"carousel_media":[{}],"location":null}}</script></body></html>"#,
        items.join(",")
    )
}

// =============================================================================
// Notes
// =============================================================================

#[tokio::test]
async fn note_is_classified_and_stored_without_author() {
    let harness = Harness::new(
        FixtureRenderer::new(),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Fitness", &["Running", "5k", "Cardio"])),
    );

    let created = harness
        .ingestor()
        .submit(1, Submission::note("Just finished a 5k run", vec![]))
        .await
        .unwrap();

    assert_eq!(created.post.platform, Platform::Notes);
    assert_eq!(created.post.tags, strings(&["Running", "5k", "Cardio"]));
    assert_eq!(created.post.author, "");
    assert_eq!(created.post.raw_data, "Just finished a 5k run");
    assert_eq!(created.post.category, "Fitness");
    assert_eq!(
        created.post_link,
        "https://lynkbin.vercel.app/dashboard?platform=notes"
    );

    let requests = harness.oracle.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].prompt.contains("Just finished a 5k run"));
    assert!(requests[0].media.is_empty());
    assert!(harness.renderer.calls().is_empty());

    assert!(harness
        .store
        .user_set(VocabularyKind::Authors, 1, Platform::Notes)
        .is_empty());
    assert_eq!(
        harness.store.user_set(VocabularyKind::Categories, 1, Platform::Notes),
        strings(&["Fitness"])
    );
    assert_eq!(harness.store.global_tags(), strings(&["5k", "Cardio", "Running"]));
}

#[tokio::test]
async fn blank_note_is_rejected_before_any_call() {
    let harness = Harness::new(
        FixtureRenderer::new(),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Fitness", &["a", "b", "c"])),
    );

    let err = harness
        .ingestor()
        .submit(1, Submission::note("   ", vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::InvalidInput(_)));
    assert_eq!(err.public_message(), "Notes are required");
    assert!(harness.oracle.requests().is_empty());
    assert!(harness.store.posts().is_empty());
}

#[tokio::test]
async fn too_many_tags_are_rejected() {
    let harness = Harness::new(
        FixtureRenderer::new(),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Fitness", &["a", "b", "c"])),
    );

    let err = harness
        .ingestor()
        .submit(1, Submission::note("hello", strings(&["a", "b", "c", "d"])))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::InvalidInput(_)));
}

// =============================================================================
// Text platforms
// =============================================================================

#[tokio::test]
async fn reddit_post_keeps_user_tag_and_learns_vocabulary() {
    let harness = Harness::with_store(
        FixtureRenderer::new().on_page(REDDIT_URL, &reddit_page()),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Science", &["Astronomy", "science", "Exoplanets", "JWST"])),
        MemoryStore::new().with_global(&["Astronomy"], &["Science"]),
    );

    let created = harness
        .ingestor()
        .submit(3, Submission::link(REDDIT_URL, strings(&["Science"])))
        .await
        .unwrap();

    let post = &created.post;
    assert_eq!(post.platform, Platform::Reddit);
    assert_eq!(post.author, "u/example");
    assert_eq!(post.tags.len(), 3);
    assert!(post.tags.contains(&"Science".to_string()));
    assert_eq!(post.tags, strings(&["Astronomy", "Science", "Exoplanets"]));

    // The prompt carries the extracted content and the global pools.
    let prompt = &harness.oracle.requests()[0].prompt;
    assert!(prompt.contains("JWST finds water on a distant exoplanet"));
    assert!(prompt.contains("clear absorption line"));
    assert!(prompt.contains("Astronomy"));

    assert_eq!(
        harness.store.user_set(VocabularyKind::Tags, 3, Platform::Reddit),
        strings(&["Astronomy", "Science", "Exoplanets"])
    );
    assert_eq!(
        harness.store.user_set(VocabularyKind::Authors, 3, Platform::Reddit),
        strings(&["u/example"])
    );
    assert_eq!(
        harness.store.global_tags(),
        strings(&["Astronomy", "Exoplanets", "Science"])
    );
}

#[tokio::test]
async fn resubmitting_does_not_duplicate_vocabulary() {
    let harness = Harness::new(
        FixtureRenderer::new().on_page(REDDIT_URL, &reddit_page()),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Science", &["Astronomy", "Exoplanets", "JWST"])),
    );
    let ingestor = harness.ingestor();

    for _ in 0..2 {
        ingestor
            .submit(3, Submission::link(REDDIT_URL, vec![]))
            .await
            .unwrap();
    }

    assert_eq!(harness.store.posts().len(), 2);
    assert_eq!(
        harness.store.user_set(VocabularyKind::Tags, 3, Platform::Reddit),
        strings(&["Astronomy", "Exoplanets", "JWST"])
    );
    assert_eq!(
        harness.store.user_set(VocabularyKind::Categories, 3, Platform::Reddit),
        strings(&["Science"])
    );
    assert_eq!(harness.store.global_categories(), strings(&["Science"]));
}

#[tokio::test]
async fn page_without_content_fails_extraction() {
    let url = "https://x.com/jack/status/20";
    let harness = Harness::new(
        FixtureRenderer::new().on_page(url, "<html><head></head><body></body></html>"),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Tech", &["a", "b", "c"])),
    );

    let err = harness
        .ingestor()
        .submit(1, Submission::link(url, vec![]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Extraction(ExtractionError::ExtractionFailed(_))
    ));
    assert_eq!(err.public_message(), "Failed to extract post details");
    assert!(harness.oracle.requests().is_empty());
    assert!(harness.store.posts().is_empty());
}

#[tokio::test]
async fn error_status_is_a_navigation_failure() {
    let page = RenderedPage {
        status: Some(404),
        final_url: REDDIT_URL.to_string(),
        html: reddit_page(),
    };
    let harness = Harness::new(
        FixtureRenderer::new().on_rendered(REDDIT_URL, page),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Science", &["a", "b", "c"])),
    );

    let err = harness
        .ingestor()
        .submit(1, Submission::link(REDDIT_URL, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Extraction(ExtractionError::NavigationFailed { .. })
    ));
}

#[tokio::test]
async fn malformed_reply_writes_nothing() {
    let harness = Harness::new(
        FixtureRenderer::new().on_page(REDDIT_URL, &reddit_page()),
        FixtureFetcher::new(),
        FixtureOracle::replying("Sure! Here are some tags: space, water"),
    );

    let err = harness
        .ingestor()
        .submit(3, Submission::link(REDDIT_URL, vec![]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Oracle(OracleError::MalformedClassification(_))
    ));
    assert_eq!(err.public_message(), "Failed to summarize post");
    assert!(harness.store.posts().is_empty());
    assert!(harness
        .store
        .user_set(VocabularyKind::Authors, 3, Platform::Reddit)
        .is_empty());
    assert!(harness.store.global_tags().is_empty());
}

#[tokio::test]
async fn slow_oracle_times_out() {
    let harness = Harness::new(
        FixtureRenderer::new(),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Fitness", &["a", "b", "c"])).with_delay(Duration::from_secs(5)),
    );

    let err = harness
        .ingestor()
        .submit(1, Submission::note("slow", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Oracle(OracleError::Timeout(_))));
    assert!(harness.store.posts().is_empty());
}

#[tokio::test]
async fn upstream_failure_detail_stays_internal() {
    let harness = Harness::new(
        FixtureRenderer::new(),
        FixtureFetcher::new(),
        FixtureOracle::failing("Gemini API error (500): backend 10.1.2.3 unavailable"),
    );

    let err = harness
        .ingestor()
        .submit(1, Submission::note("hello", vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Oracle(OracleError::UpstreamFailure(_))));
    assert!(!err.public_message().contains("10.1.2.3"));
    assert!(err.to_string().contains("10.1.2.3"));
}

#[tokio::test]
async fn failed_post_insert_is_an_internal_error() {
    let harness = Harness::with_store(
        FixtureRenderer::new(),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Fitness", &["Running", "5k", "Cardio"])),
        MemoryStore::new().failing_post_insert(),
    );

    let err = harness
        .ingestor()
        .submit(1, Submission::note("Just finished a 5k run", vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Store(StoreError::WriteFailure(_))));
    assert!(!err.is_client_error());
    assert_eq!(err.public_message(), "Failed to save post");
    // Vocabulary written before the insert stays in place.
    assert_eq!(
        harness.store.user_set(VocabularyKind::Tags, 1, Platform::Notes),
        strings(&["Running", "5k", "Cardio"])
    );
}

// =============================================================================
// Others
// =============================================================================

#[tokio::test]
async fn unrecognised_site_is_stored_with_user_tags_only() {
    let harness = Harness::new(
        FixtureRenderer::new(),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Tech", &["a", "b", "c"])),
    );

    let created = harness
        .ingestor()
        .submit(
            2,
            Submission::link("https://www.imdb.com/title/tt0081/", strings(&["Movies"])),
        )
        .await
        .unwrap();

    assert_eq!(created.post.platform, Platform::Others);
    assert_eq!(created.post.tags, strings(&["Movies"]));
    assert_eq!(created.post.category, "");
    assert_eq!(created.post.raw_data, "https://www.imdb.com/title/tt0081/");
    assert!(harness.oracle.requests().is_empty());
    assert!(harness.renderer.calls().is_empty());
    assert_eq!(
        harness.store.user_set(VocabularyKind::Tags, 2, Platform::Others),
        strings(&["Movies"])
    );
}

#[tokio::test]
async fn encoded_url_is_normalised_before_dispatch() {
    let harness = Harness::new(
        FixtureRenderer::new().on_page(REDDIT_URL, &reddit_page()),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Science", &["Astronomy", "Exoplanets", "JWST"])),
    );
    let encoded = urlencoding::encode(REDDIT_URL).into_owned();

    let created = harness
        .ingestor()
        .submit(3, Submission::link(encoded, vec![]))
        .await
        .unwrap();

    assert_eq!(created.post.raw_data, REDDIT_URL);
    assert_eq!(harness.renderer.calls()[0].0, REDDIT_URL);
}

// =============================================================================
// Instagram
// =============================================================================

#[tokio::test]
async fn carousel_is_deduplicated_and_classified_once() {
    let media = [
        "https://cdn.example/a.jpg",
        "https://cdn.example/b.jpg",
        "https://cdn.example/a.jpg",
        "https://cdn.example/c.jpg",
    ];
    let harness = Harness::new(
        FixtureRenderer::new(),
        FixtureFetcher::new()
            .on_bytes(INSTAGRAM_URL, carousel_payload(&media).into_bytes())
            .on_bytes("https://cdn.example/a.jpg", b"a".to_vec())
            .on_bytes("https://cdn.example/b.jpg", b"b".to_vec())
            .on_bytes("https://cdn.example/c.jpg", b"c".to_vec()),
        FixtureOracle::replying(reply("Nature", &["Wildlife", "Photography", "Ocean"])),
    );

    let created = harness
        .ingestor()
        .submit(5, Submission::link(INSTAGRAM_URL, vec![]))
        .await
        .unwrap();

    assert_eq!(created.post.platform, Platform::Instagram);
    assert_eq!(created.post.author, "natgeo");

    let media_requests: Vec<String> = harness
        .fetcher
        .requested()
        .into_iter()
        .filter(|u| u != INSTAGRAM_URL)
        .collect();
    assert_eq!(
        media_requests,
        strings(&[
            "https://cdn.example/a.jpg",
            "https://cdn.example/b.jpg",
            "https://cdn.example/c.jpg"
        ])
    );

    let requests = harness.oracle.requests();
    assert_eq!(requests.len(), 1);
    let labels: Vec<&str> = requests[0]
        .media
        .iter()
        .map(|m| m.context_label.as_str())
        .collect();
    assert_eq!(labels, vec!["Image 1 of 3", "Image 2 of 3", "Image 3 of 3"]);
    assert_eq!(requests[0].media[1].bytes, b"b");
    assert_eq!(requests[0].media[0].mime_type, "image/jpeg");

    assert_eq!(harness.leftover_scopes(), 0);
}

#[tokio::test]
async fn carousel_tolerates_partial_download_failure() {
    let media = [
        "https://cdn.example/a.jpg",
        "https://cdn.example/b.jpg",
        "https://cdn.example/c.jpg",
    ];
    let harness = Harness::new(
        FixtureRenderer::new(),
        FixtureFetcher::new()
            .on_bytes(INSTAGRAM_URL, carousel_payload(&media).into_bytes())
            .on_bytes("https://cdn.example/a.jpg", b"a".to_vec())
            .on_status("https://cdn.example/b.jpg", 403)
            .on_bytes("https://cdn.example/c.jpg", b"c".to_vec()),
        FixtureOracle::replying(reply("Nature", &["Wildlife", "Photography", "Ocean"])),
    );

    harness
        .ingestor()
        .submit(5, Submission::link(INSTAGRAM_URL, vec![]))
        .await
        .unwrap();

    let requests = harness.oracle.requests();
    assert_eq!(requests[0].media.len(), 2);
    assert_eq!(harness.leftover_scopes(), 0);
}

#[tokio::test]
async fn carousel_with_no_downloads_fails_and_cleans_up() {
    let media = ["https://cdn.example/a.jpg", "https://cdn.example/b.jpg"];
    let harness = Harness::new(
        FixtureRenderer::new(),
        FixtureFetcher::new()
            .on_bytes(INSTAGRAM_URL, carousel_payload(&media).into_bytes())
            .on_status("https://cdn.example/a.jpg", 403)
            .on_status("https://cdn.example/b.jpg", 500),
        FixtureOracle::replying(reply("Nature", &["Wildlife", "Photography", "Ocean"])),
    );

    let err = harness
        .ingestor()
        .submit(5, Submission::link(INSTAGRAM_URL, vec![]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Media(MediaError::NoMediaDownloaded { attempted: 2 })
    ));
    assert!(harness.oracle.requests().is_empty());
    assert!(harness.store.posts().is_empty());
    assert_eq!(harness.leftover_scopes(), 0);
}

#[tokio::test]
async fn instagram_profile_link_is_rejected() {
    let harness = Harness::new(
        FixtureRenderer::new(),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Nature", &["a", "b", "c"])),
    );

    let err = harness
        .ingestor()
        .submit(5, Submission::link("https://www.instagram.com/natgeo/", vec![]))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::InvalidInput(_)));
    assert!(harness.fetcher.requested().is_empty());
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn listing_reads_back_what_was_submitted() {
    let harness = Harness::new(
        FixtureRenderer::new().on_page(REDDIT_URL, &reddit_page()),
        FixtureFetcher::new(),
        FixtureOracle::replying(reply("Science", &["Astronomy", "Exoplanets", "JWST"])),
    );
    let ingestor = harness.ingestor();

    let first = ingestor
        .submit(3, Submission::link(REDDIT_URL, vec![]))
        .await
        .unwrap();
    ingestor
        .submit(3, Submission::link("https://example.org/a", strings(&["Misc"])))
        .await
        .unwrap();
    ingestor
        .submit(4, Submission::link("https://example.org/b", vec![]))
        .await
        .unwrap();

    let all = ingestor.posts(3, &PostFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    let reddit_only = PostFilter {
        platform: Some(Platform::Reddit),
        ..Default::default()
    };
    assert_eq!(ingestor.posts(3, &reddit_only).await.unwrap().len(), 1);

    let by_tag = PostFilter {
        tags: strings(&["Misc", "Nope"]),
        ..Default::default()
    };
    let tagged = ingestor.posts(3, &by_tag).await.unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].platform, Platform::Others);

    assert_eq!(ingestor.recent_posts(3).await.unwrap().len(), 2);
    assert_eq!(
        ingestor
            .vocabulary(VocabularyKind::Authors, 3, Platform::Reddit)
            .await
            .unwrap(),
        strings(&["u/example"])
    );

    let counts = ingestor.counts(3).await.unwrap();
    assert_eq!(counts.total_posts_count, 2);
    assert_eq!(counts.total_tags_count, 4);
    assert_eq!(counts.total_categories_count, 1);

    // Another user cannot delete the post.
    let err = ingestor.delete_post(4, first.post.id).await.unwrap_err();
    assert!(matches!(err, IngestError::Store(StoreError::NotFound(_))));
    assert!(err.is_client_error());

    ingestor.delete_post(3, first.post.id).await.unwrap();
    assert_eq!(ingestor.posts(3, &PostFilter::default()).await.unwrap().len(), 1);
    // Vocabulary is never shrunk by deletion.
    assert_eq!(
        ingestor
            .vocabulary(VocabularyKind::Tags, 3, Platform::Reddit)
            .await
            .unwrap()
            .len(),
        3
    );
}
