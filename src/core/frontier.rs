// src/core/frontier.rs

//! The deduplicated queue of resources a scan still has to fetch.
//!
//! Every URI is keyed by its normalized form (origin, lowercased path without trailing
//! slash, query). A key moves `Queued -> InFlight -> Done` exactly once, so the network sees
//! each key at most once per scan. Later leads for the same key are merged into the pending
//! entry, or handed back with the stored response when the fetch already finished.
//!
//! The frontier also remembers every key a seed or crawled link ever pointed at, whatever
//! happened to the lead, so link-dependent results can be settled independently of timing.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use url::{Origin, Url};

use crate::core::http::FetchedResource;
use crate::core::models::DiscoveryMethod;

/// Why a URI was put on the frontier. One entry may collect several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Seed,
    Crawled { from: Url },
    WordlistProbed { from: Url },
    Mutated { origin: Url, rule: String },
    FingerprintProbe { signature: usize, probe: usize, root: Url },
    NestedProbe { signature: usize, plugin: usize, probe: usize, root: Url },
}

impl Provenance {
    pub fn method(&self) -> DiscoveryMethod {
        match self {
            Provenance::Seed => DiscoveryMethod::Seed,
            Provenance::Crawled { .. } => DiscoveryMethod::Crawled,
            Provenance::WordlistProbed { .. } => DiscoveryMethod::WordlistProbed,
            Provenance::Mutated { .. } => DiscoveryMethod::Mutated,
            Provenance::FingerprintProbe { .. } => DiscoveryMethod::FingerprintProbe,
            Provenance::NestedProbe { .. } => DiscoveryMethod::NestedProbe,
        }
    }

    /// Page leads get the full crawl/discover/fingerprint/mutate treatment.
    pub fn is_page(&self) -> bool {
        matches!(self, Provenance::Seed | Provenance::Crawled { .. } | Provenance::WordlistProbed { .. })
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Provenance::Seed | Provenance::Crawled { .. })
    }

    pub fn is_wordlist(&self) -> bool {
        matches!(self, Provenance::WordlistProbed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: Url,
    pub key: String,
    pub depth: usize,
    pub provenance: Vec<Provenance>,
}

/// What happened to an insert.
#[derive(Debug)]
pub enum Admission {
    Queued,
    /// Already pending; the lead was attached to the pending entry.
    Merged,
    /// Already fetched. The caller evaluates the lead against the stored response;
    /// `run_page` says whether the page stages still have to run for it. A first wordlist
    /// lead on an already paged key comes back with `run_page: false`.
    Fetched { resource: Arc<FetchedResource>, run_page: bool },
    /// Already fetched (or unreachable) and nothing left to do for this lead.
    Duplicate,
    OutOfScope,
}

#[derive(Debug)]
enum Slot {
    Queued { depth: usize, provenance: Vec<Provenance> },
    InFlight { late: Vec<Provenance> },
    /// `probed` is set once a wordlist lead has been evaluated against the response.
    Done { resource: Option<Arc<FetchedResource>>, paged: bool, probed: bool },
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    queue: VecDeque<(String, Url)>,
    linked: HashSet<String>,
    in_flight: usize,
}

pub enum Next {
    Entry(FrontierEntry),
    /// Nothing queued and nothing in flight.
    Idle,
}

#[derive(Debug)]
pub struct Frontier {
    origin: Origin,
    inner: Mutex<Inner>,
    changed: Notify,
}

/// Normalized key for at-most-once dispatch: fragment dropped, path compared
/// case-insensitively and without a trailing slash.
pub fn normalize_key(url: &Url) -> String {
    let mut path = url.path().to_lowercase();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    match url.query() {
        Some(query) => format!("{}{}?{}", url.origin().ascii_serialization(), path, query),
        None => format!("{}{}", url.origin().ascii_serialization(), path),
    }
}

impl Frontier {
    pub fn new(target: &Url) -> Self {
        Self { origin: target.origin(), inner: Mutex::new(Inner::default()), changed: Notify::new() }
    }

    pub fn in_scope(&self, url: &Url) -> bool {
        url.origin() == self.origin
    }

    pub fn insert(&self, mut url: Url, depth: usize, provenance: Provenance) -> Admission {
        if !self.in_scope(&url) {
            return Admission::OutOfScope;
        }
        url.set_fragment(None);
        let key = normalize_key(&url);

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if provenance.is_link() {
            inner.linked.insert(key.clone());
        }
        let admission = match inner.slots.get_mut(&key) {
            None => {
                inner.slots.insert(key.clone(), Slot::Queued { depth, provenance: vec![provenance] });
                inner.queue.push_back((key, url));
                Admission::Queued
            }
            Some(Slot::Queued { provenance: leads, .. }) => {
                if !leads.contains(&provenance) {
                    leads.push(provenance);
                }
                return Admission::Merged;
            }
            Some(Slot::InFlight { late }) => {
                if !late.contains(&provenance) {
                    late.push(provenance);
                }
                return Admission::Merged;
            }
            Some(Slot::Done { resource: None, .. }) => return Admission::Duplicate,
            Some(Slot::Done { resource: Some(resource), paged, probed }) => {
                let first_probe = provenance.is_wordlist() && !*probed;
                if first_probe {
                    *probed = true;
                }
                if provenance.is_page() {
                    if !*paged {
                        *paged = true;
                        return Admission::Fetched { resource: resource.clone(), run_page: true };
                    }
                    if first_probe {
                        return Admission::Fetched { resource: resource.clone(), run_page: false };
                    }
                    return Admission::Duplicate;
                }
                if matches!(provenance, Provenance::Mutated { .. }) {
                    return Admission::Duplicate;
                }
                return Admission::Fetched { resource: resource.clone(), run_page: false };
            }
        };
        drop(guard);
        self.changed.notify_waiters();
        admission
    }

    fn try_next(&self) -> Option<Next> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        while let Some((key, url)) = inner.queue.pop_front() {
            let Some(slot) = inner.slots.get_mut(&key) else { continue };
            if !matches!(slot, Slot::Queued { .. }) {
                continue;
            }
            let Slot::Queued { depth, provenance } = std::mem::replace(slot, Slot::InFlight { late: Vec::new() }) else {
                continue;
            };
            inner.in_flight += 1;
            return Some(Next::Entry(FrontierEntry { url, key, depth, provenance }));
        }
        if inner.in_flight == 0 { Some(Next::Idle) } else { None }
    }

    /// Waits for the next entry, or for the frontier to drain completely.
    pub async fn next(&self) -> Next {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(next) = self.try_next() {
                return next;
            }
            notified.await;
        }
    }

    /// Marks an in-flight entry as fetched (or unreachable when `resource` is `None`) and
    /// returns the leads that arrived while it was in flight. `initial` are the leads the
    /// entry was dequeued with. The entry keeps counting as in flight until
    /// [`Frontier::settle`], so idle detection waits for its follow-up work.
    pub fn complete(&self, key: &str, resource: Option<Arc<FetchedResource>>, initial: &[Provenance]) -> Vec<Provenance> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let late = match inner.slots.get_mut(key) {
            Some(slot) if matches!(slot, Slot::InFlight { .. }) => {
                let placeholder = Slot::Done { resource: None, paged: false, probed: false };
                let late = match std::mem::replace(slot, placeholder) {
                    Slot::InFlight { late } => late,
                    _ => Vec::new(),
                };
                let paged = initial.iter().chain(&late).any(Provenance::is_page);
                let probed = initial.iter().chain(&late).any(Provenance::is_wordlist);
                *slot = Slot::Done { resource, paged, probed };
                late
            }
            _ => Vec::new(),
        };
        drop(guard);
        self.changed.notify_waiters();
        late
    }

    /// Releases one in-flight slot once everything the fetch produced has been queued.
    pub fn settle(&self) {
        {
            let mut inner = self.inner.lock();
            inner.in_flight = inner.in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }

    /// Whether any seed or crawled link ever pointed at `url`'s key.
    pub fn is_linked(&self, url: &Url) -> bool {
        self.inner.lock().linked.contains(&normalize_key(url))
    }

    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.queue.len(), inner.in_flight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn crawled() -> Provenance {
        Provenance::Crawled { from: url("http://t.test/") }
    }

    fn fetched(u: &str) -> Arc<FetchedResource> {
        Arc::new(FetchedResource { url: url(u), status: 200, headers: HeaderMap::new(), body: String::new() })
    }

    #[test]
    fn keys_ignore_case_fragment_and_trailing_slash() {
        assert_eq!(normalize_key(&url("http://t.test/Admin/")), normalize_key(&url("http://t.test/admin#top")));
        assert_ne!(normalize_key(&url("http://t.test/a?x=1")), normalize_key(&url("http://t.test/a?x=2")));
        assert_eq!(normalize_key(&url("http://t.test/")), "http://t.test/");
    }

    #[tokio::test]
    async fn duplicate_inserts_are_merged() {
        let frontier = Frontier::new(&url("http://t.test/"));
        assert!(matches!(frontier.insert(url("http://t.test/a"), 1, Provenance::Seed), Admission::Queued));
        assert!(matches!(frontier.insert(url("http://t.test/A/"), 1, crawled()), Admission::Merged));
        assert_eq!(frontier.queued(), 1);

        let Next::Entry(entry) = frontier.next().await else { panic!("expected entry") };
        assert_eq!(entry.provenance, vec![Provenance::Seed, crawled()]);
        assert_eq!(frontier.in_flight(), 1);
    }

    #[test]
    fn off_origin_is_rejected() {
        let frontier = Frontier::new(&url("http://t.test/"));
        assert!(matches!(frontier.insert(url("http://other.test/"), 1, crawled()), Admission::OutOfScope));
        assert!(matches!(frontier.insert(url("https://t.test/"), 1, crawled()), Admission::OutOfScope));
        assert!(matches!(frontier.insert(url("http://t.test:8080/"), 1, crawled()), Admission::OutOfScope));
    }

    #[tokio::test]
    async fn late_leads_are_returned_on_completion() {
        let frontier = Frontier::new(&url("http://t.test/"));
        frontier.insert(url("http://t.test/a"), 1, Provenance::Seed);
        let Next::Entry(entry) = frontier.next().await else { panic!("expected entry") };

        let probe = Provenance::FingerprintProbe { signature: 0, probe: 0, root: url("http://t.test/") };
        assert!(matches!(frontier.insert(url("http://t.test/a"), 1, probe.clone()), Admission::Merged));

        let late = frontier.complete(&entry.key, Some(fetched("http://t.test/a")), &entry.provenance);
        assert_eq!(late, vec![probe]);
        assert_eq!(frontier.in_flight(), 1);
        frontier.settle();
        assert!(matches!(frontier.next().await, Next::Idle));
    }

    #[tokio::test]
    async fn completed_entries_hand_back_their_response_once_per_page() {
        let frontier = Frontier::new(&url("http://t.test/"));
        let probe = Provenance::FingerprintProbe { signature: 0, probe: 0, root: url("http://t.test/") };
        frontier.insert(url("http://t.test/v.txt"), 1, probe.clone());
        let Next::Entry(entry) = frontier.next().await else { panic!("expected entry") };
        frontier.complete(&entry.key, Some(fetched("http://t.test/v.txt")), &entry.provenance);

        assert!(matches!(
            frontier.insert(url("http://t.test/v.txt"), 1, crawled()),
            Admission::Fetched { run_page: true, .. }
        ));
        assert!(matches!(frontier.insert(url("http://t.test/v.txt"), 1, crawled()), Admission::Duplicate));
        assert!(matches!(
            frontier.insert(url("http://t.test/v.txt"), 1, probe),
            Admission::Fetched { run_page: false, .. }
        ));
    }

    #[tokio::test]
    async fn first_wordlist_lead_on_a_crawled_page_is_handed_back_once() {
        let frontier = Frontier::new(&url("http://t.test/"));
        let wordlist = Provenance::WordlistProbed { from: url("http://t.test/") };
        frontier.insert(url("http://t.test/secret"), 1, crawled());
        let Next::Entry(entry) = frontier.next().await else { panic!("expected entry") };
        frontier.complete(&entry.key, Some(fetched("http://t.test/secret")), &entry.provenance);

        assert!(matches!(
            frontier.insert(url("http://t.test/secret"), 1, wordlist.clone()),
            Admission::Fetched { run_page: false, .. }
        ));
        assert!(matches!(frontier.insert(url("http://t.test/secret"), 1, wordlist), Admission::Duplicate));
    }

    #[tokio::test]
    async fn links_are_remembered_whatever_their_admission() {
        let frontier = Frontier::new(&url("http://t.test/"));
        let wordlist = Provenance::WordlistProbed { from: url("http://t.test/") };
        frontier.insert(url("http://t.test/secret"), 1, wordlist);
        let Next::Entry(entry) = frontier.next().await else { panic!("expected entry") };
        frontier.complete(&entry.key, Some(fetched("http://t.test/secret")), &entry.provenance);
        assert!(!frontier.is_linked(&url("http://t.test/secret")));

        assert!(matches!(frontier.insert(url("http://t.test/Secret/"), 2, crawled()), Admission::Duplicate));
        assert!(frontier.is_linked(&url("http://t.test/secret")));
        assert!(!frontier.is_linked(&url("http://t.test/other")));
    }

    #[tokio::test]
    async fn unreachable_entries_are_never_refetched() {
        let frontier = Frontier::new(&url("http://t.test/"));
        frontier.insert(url("http://t.test/down"), 1, crawled());
        let Next::Entry(entry) = frontier.next().await else { panic!("expected entry") };
        frontier.complete(&entry.key, None, &entry.provenance);
        frontier.settle();
        assert!(matches!(frontier.insert(url("http://t.test/down"), 1, crawled()), Admission::Duplicate));
        assert_eq!(frontier.queued(), 0);
    }

    #[tokio::test]
    async fn waiting_worker_wakes_on_insert() {
        let frontier = Arc::new(Frontier::new(&url("http://t.test/")));
        frontier.insert(url("http://t.test/"), 0, Provenance::Seed);
        let Next::Entry(first) = frontier.next().await else { panic!("expected entry") };

        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move {
                match frontier.next().await {
                    Next::Entry(entry) => Some(entry.url.path().to_string()),
                    Next::Idle => None,
                }
            })
        };

        tokio::task::yield_now().await;
        frontier.insert(url("http://t.test/b"), 1, crawled());
        frontier.complete(&first.key, Some(fetched("http://t.test/")), &first.provenance);

        assert_eq!(waiter.await.unwrap(), Some("/b".to_string()));
    }
}
