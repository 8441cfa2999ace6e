// Test doubles for the ingestion pipeline.
//
// One double per trait boundary:
// - MockListingStore (ListingStore): stateful in-memory listing table
// - ScriptedCompletion (TextCompletion): queued responses, optionally routed by prompt text
// - MockExtractor (PostExtractor): legacy_id→outcome map
// - MockDatasetSource (DatasetSource): dataset_id→items map
//
// Plus fixture builders for posts, scraper items and stored listings.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ai_client::{AiError, CompletionOptions, TextCompletion};
use apify_client::{FacebookAttachment, FacebookGroupPost, FacebookImage, FacebookUser};
use roomscout_common::{
    Attachment, Author, Listing, ListingUpdate, NewListing, PostedBy, ProvenanceField, RawPost,
    UpsertOutcome, Utilities,
};

use crate::extractor::{ExtractionOutcome, ListingFields, PostExtractor};
use crate::fingerprint::Fingerprinter;
use crate::traits::{DatasetSource, ListingStore};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const TEST_GROUP_ID: &str = "g1";
pub const TEST_GROUP_TITLE: &str = "Phòng trọ Hà Nội";
pub const TEST_IMAGE: &str = "https://cdn.example.com/room.jpg";

/// A valid post by author `u1` in group `g1` with one image.
pub fn post(legacy_id: &str, text: &str) -> RawPost {
    RawPost {
        legacy_id: legacy_id.to_string(),
        text: text.to_string(),
        attachments: vec![Attachment {
            image_uri: Some(TEST_IMAGE.to_string()),
        }],
        user: Some(Author {
            id: Some("u1".to_string()),
            name: Some("Lan Nguyen".to_string()),
        }),
        group_id: Some(TEST_GROUP_ID.to_string()),
        group_title: Some(TEST_GROUP_TITLE.to_string()),
        published_at: None,
        url: Some(format!("https://www.facebook.com/groups/{TEST_GROUP_ID}/posts/{legacy_id}/")),
        contact_phone: None,
    }
}

/// The scraper item that intake turns into [`post`].
pub fn scraper_item(legacy_id: &str, text: &str) -> FacebookGroupPost {
    FacebookGroupPost {
        legacy_id: Some(legacy_id.to_string()),
        text: Some(text.to_string()),
        url: Some(format!("https://www.facebook.com/groups/{TEST_GROUP_ID}/posts/{legacy_id}/")),
        user: Some(FacebookUser {
            id: Some("u1".to_string()),
            name: Some("Lan Nguyen".to_string()),
        }),
        attachments: Some(vec![FacebookAttachment {
            image: Some(FacebookImage {
                uri: Some(TEST_IMAGE.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        facebook_id: Some(TEST_GROUP_ID.to_string()),
        group_title: Some(TEST_GROUP_TITLE.to_string()),
        ..Default::default()
    }
}

/// A stored listing for `post`, created now, with fingerprinted provenance.
pub fn listing_for(post: &RawPost) -> Listing {
    let provenance = Fingerprinter::default().provenance(post);
    NewListing {
        id: post.legacy_id.clone(),
        title: format!("Listing {}", post.legacy_id),
        description: post.text.clone(),
        thumbnail: post.first_image_uri().unwrap_or_default().to_string(),
        address: String::new(),
        district: String::new(),
        ward: None,
        price: 2_000_000,
        area: 0.0,
        posted_by: PostedBy::anonymous(),
        posted_at: Utc::now(),
        fb_link: post.permalink().unwrap_or_default().to_string(),
        fb_group_name: post.group_title().unwrap_or_default().to_string(),
        coordinates: None,
        amenities: Vec::new(),
        rules: Vec::new(),
        images: post.image_uris(),
        contact_phone: None,
        deposit_required: None,
        utilities: Utilities::default(),
        room_type: None,
        available: true,
        raw_fb_data: serde_json::to_value(&provenance).unwrap_or_default(),
    }
    .into_listing(Utc::now())
}

/// Extracted fields with a title and a price and nothing else.
pub fn fields(title: &str, price: i64) -> ListingFields {
    ListingFields {
        title: Some(title.to_string()),
        description: None,
        address: None,
        district: None,
        ward: None,
        price: Some(price),
        area: None,
        amenities: Vec::new(),
        rules: Vec::new(),
        contact_phone: None,
        deposit_required: None,
        utilities: Utilities::default(),
        room_type: None,
        images: Vec::new(),
        posted_by: PostedBy::anonymous(),
        posted_at: None,
        fb_link: String::new(),
        fb_group_name: String::new(),
    }
}

// ---------------------------------------------------------------------------
// MockListingStore
// ---------------------------------------------------------------------------

/// In-memory listing table with the same upsert semantics as Postgres.
pub struct MockListingStore {
    rows: Mutex<HashMap<String, Listing>>,
    fail_reads: bool,
    fail_writes: HashSet<String>,
    similarity_lookups: AtomicUsize,
    writes: Mutex<Vec<(String, UpsertOutcome)>>,
    racing_inserts: Mutex<HashMap<String, Listing>>,
}

impl Default for MockListingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockListingStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            fail_reads: false,
            fail_writes: HashSet::new(),
            similarity_lookups: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            racing_inserts: Mutex::new(HashMap::new()),
        }
    }

    /// Every lookup returns an error.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Writes for `id` return an error.
    pub fn failing_write(mut self, id: &str) -> Self {
        self.fail_writes.insert(id.to_string());
        self
    }

    /// Another writer stores `listing` just before this store's next write
    /// for the same id, after any lookup has already missed it.
    pub fn racing_insert(self, listing: Listing) -> Self {
        self.racing_inserts
            .lock()
            .unwrap()
            .insert(listing.id.clone(), listing);
        self
    }

    fn land_racing_insert(&self, id: &str) {
        if let Some(listing) = self.racing_inserts.lock().unwrap().remove(id) {
            self.insert(listing);
        }
    }

    pub fn insert(&self, listing: Listing) {
        self.rows.lock().unwrap().insert(listing.id.clone(), listing);
    }

    pub fn get(&self, id: &str) -> Option<Listing> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn similarity_lookups(&self) -> usize {
        self.similarity_lookups.load(Ordering::SeqCst)
    }

    /// Every successful write in order.
    pub fn writes(&self) -> Vec<(String, UpsertOutcome)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingStore for MockListingStore {
    async fn find_by_key(&self, id: &str) -> Result<Option<Listing>> {
        if self.fail_reads {
            bail!("MockListingStore: reads disabled");
        }
        Ok(self.get(id))
    }

    async fn find_by_provenance_field(
        &self,
        field: ProvenanceField,
        value: &str,
        created_after: Option<DateTime<Utc>>,
    ) -> Result<Option<Listing>> {
        if self.fail_reads {
            bail!("MockListingStore: reads disabled");
        }
        if field == ProvenanceField::SimilarityHash {
            self.similarity_lookups.fetch_add(1, Ordering::SeqCst);
        }
        let rows = self.rows.lock().unwrap();
        let mut matches: Vec<&Listing> = rows
            .values()
            .filter(|l| l.raw_fb_data.get(field.json_key()).and_then(|v| v.as_str()) == Some(value))
            .filter(|l| created_after.map_or(true, |after| l.created_at >= after))
            .collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matches.first().map(|l| (*l).clone()))
    }

    async fn create_or_update(
        &self,
        create: &NewListing,
        update: &ListingUpdate,
    ) -> Result<UpsertOutcome> {
        if self.fail_writes.contains(&create.id) {
            bail!("MockListingStore: write rejected for {}", create.id);
        }
        self.land_racing_insert(&create.id);
        let now = Utc::now();
        let outcome = {
            let mut rows = self.rows.lock().unwrap();
            match rows.get_mut(&create.id) {
                Some(existing) => {
                    existing.apply_update(update, now);
                    UpsertOutcome::Updated
                }
                None => {
                    rows.insert(create.id.clone(), create.clone().into_listing(now));
                    UpsertOutcome::Created
                }
            }
        };
        self.writes.lock().unwrap().push((create.id.clone(), outcome));
        Ok(outcome)
    }

    async fn create_if_absent(&self, create: &NewListing) -> Result<bool> {
        if self.fail_writes.contains(&create.id) {
            bail!("MockListingStore: write rejected for {}", create.id);
        }
        self.land_racing_insert(&create.id);
        {
            let mut rows = self.rows.lock().unwrap();
            if rows.contains_key(&create.id) {
                return Ok(false);
            }
            rows.insert(create.id.clone(), create.clone().into_listing(Utc::now()));
        }
        self.writes
            .lock()
            .unwrap()
            .push((create.id.clone(), UpsertOutcome::Created));
        Ok(true)
    }

    async fn soft_delete(&self, id: &str) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(id) {
            Some(listing) => {
                listing.available = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedCompletion
// ---------------------------------------------------------------------------

type Reply = std::result::Result<String, AiError>;

/// Completion double replaying queued replies.
///
/// Routed replies are consumed when the user prompt contains the route's
/// fragment; everything else draws from the shared queue, then the fallback.
/// With nothing left the call fails with `EmptyResponse`.
pub struct ScriptedCompletion {
    queue: Mutex<VecDeque<Reply>>,
    routes: Mutex<Vec<(String, VecDeque<Reply>)>>,
    fallback: Option<Box<dyn Fn() -> Reply + Send + Sync>>,
    calls: AtomicUsize,
    last_options: Mutex<Option<CompletionOptions>>,
}

impl Default for ScriptedCompletion {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            routes: Mutex::new(Vec::new()),
            fallback: None,
            calls: AtomicUsize::new(0),
            last_options: Mutex::new(None),
        }
    }

    pub fn then_ok(self, body: &str) -> Self {
        self.queue.lock().unwrap().push_back(Ok(body.to_string()));
        self
    }

    pub fn then_err(self, error: AiError) -> Self {
        self.queue.lock().unwrap().push_back(Err(error));
        self
    }

    /// Replies used, in order, for prompts containing `fragment`.
    pub fn route(self, fragment: &str, replies: Vec<Reply>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .push((fragment.to_string(), replies.into()));
        self
    }

    pub fn always_ok(body: &str) -> Self {
        let body = body.to_string();
        Self {
            fallback: Some(Box::new(move || Ok(body.clone()))),
            ..Self::new()
        }
    }

    pub fn always_err<F>(make: F) -> Self
    where
        F: Fn() -> AiError + Send + Sync + 'static,
    {
        Self {
            fallback: Some(Box::new(move || Err(make()))),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<CompletionOptions> {
        self.last_options.lock().unwrap().clone()
    }

    fn next_reply(&self, user_prompt: &str) -> Reply {
        {
            let mut routes = self.routes.lock().unwrap();
            if let Some((_, replies)) = routes
                .iter_mut()
                .find(|(fragment, _)| user_prompt.contains(fragment.as_str()))
            {
                if let Some(reply) = replies.pop_front() {
                    return reply;
                }
            }
        }
        if let Some(reply) = self.queue.lock().unwrap().pop_front() {
            return reply;
        }
        match &self.fallback {
            Some(make) => make(),
            None => Err(AiError::EmptyResponse),
        }
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> std::result::Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options.clone());
        self.next_reply(user_prompt)
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Returns a fixed outcome per legacy_id. Unregistered ids are rejected.
pub struct MockExtractor {
    outcomes: HashMap<String, ExtractionOutcome>,
    delays: HashMap<String, Duration>,
    panics: HashSet<String>,
    seen: Mutex<Vec<String>>,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            outcomes: HashMap::new(),
            delays: HashMap::new(),
            panics: HashSet::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn on_post(mut self, legacy_id: &str, outcome: ExtractionOutcome) -> Self {
        self.outcomes.insert(legacy_id.to_string(), outcome);
        self
    }

    pub fn accept(self, legacy_id: &str, fields: ListingFields) -> Self {
        self.on_post(
            legacy_id,
            ExtractionOutcome::Accepted {
                fields: Box::new(fields),
            },
        )
    }

    pub fn reject(self, legacy_id: &str, reason: &str) -> Self {
        self.on_post(legacy_id, ExtractionOutcome::rejected(reason))
    }

    /// Sleep before answering for `legacy_id`.
    pub fn delay(mut self, legacy_id: &str, delay: Duration) -> Self {
        self.delays.insert(legacy_id.to_string(), delay);
        self
    }

    /// Panic inside the extraction task for `legacy_id`.
    pub fn panic_on(mut self, legacy_id: &str) -> Self {
        self.panics.insert(legacy_id.to_string());
        self
    }

    /// Legacy ids in the order extraction started.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostExtractor for MockExtractor {
    async fn extract(&self, post: &RawPost) -> ExtractionOutcome {
        self.seen.lock().unwrap().push(post.legacy_id.clone());
        if let Some(delay) = self.delays.get(&post.legacy_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.panics.contains(&post.legacy_id) {
            panic!("MockExtractor: scripted panic for {}", post.legacy_id);
        }
        self.outcomes
            .get(&post.legacy_id)
            .cloned()
            .unwrap_or_else(|| ExtractionOutcome::rejected("MockExtractor: no outcome registered"))
    }
}

// ---------------------------------------------------------------------------
// MockDatasetSource
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockDatasetSource {
    datasets: HashMap<String, Vec<serde_json::Value>>,
    fetch_delay: Duration,
}

impl MockDatasetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_dataset(self, dataset_id: &str, items: Vec<FacebookGroupPost>) -> Self {
        let values = items
            .iter()
            .map(|item| serde_json::to_value(item).unwrap_or_default())
            .collect();
        self.on_raw_dataset(dataset_id, values)
    }

    /// Register items as raw JSON, malformed ones included.
    pub fn on_raw_dataset(mut self, dataset_id: &str, items: Vec<serde_json::Value>) -> Self {
        self.datasets.insert(dataset_id.to_string(), items);
        self
    }

    /// Sleep before answering every fetch.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }
}

#[async_trait]
impl DatasetSource for MockDatasetSource {
    async fn dataset_items(&self, dataset_id: &str) -> Result<Vec<serde_json::Value>> {
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        self.datasets
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("MockDatasetSource: no dataset registered for {dataset_id}"))
    }
}
