use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::data::ProductService;
use crate::openfoodfacts::{FetchError, Product, ProductPage};

pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Accumulated catalog state. Only [`FeedLoader`] mutates it.
#[derive(Debug, Clone)]
pub struct FeedState {
    records: Vec<Product>,
    page: u32,
    in_flight: bool,
    error: Option<String>,
    exhausted: bool,
    catalog_size: Option<u64>,
    revision: u64,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            page: 1,
            in_flight: false,
            error: None,
            exhausted: false,
            catalog_size: None,
            revision: 0,
        }
    }
}

impl FeedState {
    pub fn records(&self) -> &[Product] {
        &self.records
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    /// Product count the catalog last reported, if any.
    pub fn catalog_size(&self) -> Option<u64> {
        self.catalog_size
    }

    /// Bumped on every change to `records`.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus<'a> {
    Idle,
    LoadingFirstPage,
    Ready,
    Failed(&'a str),
}

struct PendingPage {
    request_id: u64,
    page: u32,
    cancel_flag: Arc<AtomicBool>,
}

struct PageResponse {
    request_id: u64,
    page: u32,
    result: Result<ProductPage, FetchError>,
}

pub struct FeedLoader {
    service: Arc<dyn ProductService>,
    page_size: u32,
    state: FeedState,
    started: bool,
    closed: bool,
    next_request_id: u64,
    pending: Option<PendingPage>,
    response_tx: Sender<PageResponse>,
    response_rx: Receiver<PageResponse>,
}

impl FeedLoader {
    pub fn new(service: Arc<dyn ProductService>, page_size: u32) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            service,
            page_size: page_size.max(1),
            state: FeedState::default(),
            started: false,
            closed: false,
            next_request_id: 1,
            pending: None,
            response_tx,
            response_rx,
        }
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn status(&self) -> FeedStatus<'_> {
        if let Some(message) = self.state.error.as_deref() {
            return FeedStatus::Failed(message);
        }
        if !self.started {
            return FeedStatus::Idle;
        }
        if self.state.in_flight && self.state.page == 1 {
            return FeedStatus::LoadingFirstPage;
        }
        FeedStatus::Ready
    }

    /// A later page is on its way; the list shows a trailing loading row.
    pub fn is_fetching_more(&self) -> bool {
        self.state.in_flight && self.state.page > 1
    }

    /// Fetches page 1. Later calls are no-ops.
    pub fn start(&mut self) {
        if self.started || self.closed {
            return;
        }
        self.started = true;
        self.fetch(self.state.page);
    }

    /// Moves to the next page and fetches it. Returns whether a request went out.
    pub fn advance_page(&mut self) -> bool {
        if !self.started || self.closed {
            return false;
        }
        if self.state.in_flight {
            tracing::debug!(page = self.state.page, "page advance ignored: fetch in flight");
            return false;
        }
        if self.state.error.is_some() || self.state.exhausted {
            return false;
        }
        self.state.page += 1;
        tracing::info!(page = self.state.page, "advancing feed page");
        self.fetch(self.state.page);
        true
    }

    fn fetch(&mut self, page: u32) {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending = Some(PendingPage {
            request_id,
            page,
            cancel_flag: cancel_flag.clone(),
        });
        self.state.in_flight = true;

        let tx = self.response_tx.clone();
        let service = self.service.clone();
        let page_size = self.page_size;
        tracing::debug!(request_id, page, page_size, "fetching products page");

        thread::spawn(move || {
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let result = service.load_page(page, page_size);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(PageResponse {
                request_id,
                page,
                result,
            });
        });
    }

    /// Applies any delivered pages. Returns `true` when the state changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(response) = self.response_rx.try_recv() {
            changed |= self.apply(response);
        }
        changed
    }

    /// Blocks until one delivered page has been applied or `timeout` passes.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        match self.response_rx.recv_timeout(timeout) {
            Ok(response) => self.apply(response),
            Err(_) => false,
        }
    }

    fn apply(&mut self, response: PageResponse) -> bool {
        if self.closed {
            return false;
        }
        let Some(pending) = &self.pending else {
            return false;
        };
        if pending.cancel_flag.load(Ordering::SeqCst)
            || pending.request_id != response.request_id
            || pending.page != response.page
        {
            return false;
        }
        self.pending = None;
        self.state.in_flight = false;

        match response.result {
            Ok(batch) => {
                let received = batch.products.len();
                if received == 0 {
                    self.state.exhausted = true;
                }
                if batch.count.is_some() {
                    self.state.catalog_size = batch.count;
                }
                self.state.records.extend(batch.products);
                self.state.error = None;
                self.state.revision = self.state.revision.wrapping_add(1);
                tracing::info!(
                    page = response.page,
                    received,
                    total = self.state.records.len(),
                    "products page loaded"
                );
            }
            Err(err) => {
                tracing::warn!(page = response.page, error = %err, "products page failed");
                self.state.error = Some(err.message().to_string());
            }
        }
        true
    }

    /// Abandons any in-flight fetch; later deliveries are discarded.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(pending) = self.pending.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
            tracing::debug!(page = pending.page, "abandoning in-flight fetch");
        }
    }
}

impl Drop for FeedLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct MockService {
        calls: Mutex<Vec<(u32, u32)>>,
        failures: HashMap<u32, String>,
        empty_from: Option<u32>,
        count: Option<u64>,
        gate: Option<Receiver<()>>,
    }

    impl MockService {
        fn calls(&self) -> Vec<(u32, u32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProductService for MockService {
        fn load_page(&self, page: u32, page_size: u32) -> Result<ProductPage, FetchError> {
            self.calls.lock().unwrap().push((page, page_size));
            if let Some(gate) = &self.gate {
                let _ = gate.recv_timeout(WAIT);
            }
            if let Some(message) = self.failures.get(&page) {
                return Err(FetchError::new(message.clone()));
            }
            if self.empty_from.is_some_and(|first| page >= first) {
                return Ok(ProductPage::default());
            }
            Ok(ProductPage {
                products: (0..2)
                    .map(|slot| Product {
                        id: Some(format!("{page}-{slot}")),
                        product_name: Some(format!("Product {page}.{slot}")),
                        ..Product::default()
                    })
                    .collect(),
                count: self.count,
            })
        }
    }

    fn loader(service: MockService) -> (FeedLoader, Arc<MockService>) {
        let service = Arc::new(service);
        let loader = FeedLoader::new(service.clone(), 40);
        (loader, service)
    }

    #[test]
    fn initial_load_fetches_first_page() {
        let (mut loader, service) = loader(MockService::default());
        assert_eq!(loader.status(), FeedStatus::Idle);
        loader.start();
        assert!(loader.state().in_flight());
        assert_eq!(loader.status(), FeedStatus::LoadingFirstPage);
        assert!(loader.wait(WAIT));
        assert!(!loader.state().in_flight());
        assert_eq!(loader.status(), FeedStatus::Ready);
        assert_eq!(loader.state().records().len(), 2);
        assert_eq!(loader.state().page(), 1);
        assert_eq!(service.calls(), vec![(1, 40)]);

        loader.start();
        assert!(!loader.state().in_flight());
    }

    #[test]
    fn advance_appends_next_page() {
        let (mut loader, service) = loader(MockService::default());
        loader.start();
        assert!(loader.wait(WAIT));
        let revision = loader.state().revision();

        assert!(loader.advance_page());
        assert!(loader.is_fetching_more());
        assert!(loader.wait(WAIT));
        assert_eq!(loader.state().page(), 2);
        assert_eq!(loader.state().records().len(), 4);
        assert!(loader.state().revision() > revision);
        let ids: Vec<_> = loader
            .state()
            .records()
            .iter()
            .filter_map(|product| product.id.clone())
            .collect();
        assert_eq!(ids, vec!["1-0", "1-1", "2-0", "2-1"]);
        assert_eq!(service.calls(), vec![(1, 40), (2, 40)]);
    }

    #[test]
    fn advance_while_in_flight_is_noop() {
        let (release, gate) = unbounded();
        let (mut loader, service) = loader(MockService {
            gate: Some(gate),
            ..MockService::default()
        });
        loader.start();
        assert!(!loader.advance_page());
        assert!(!loader.advance_page());
        assert_eq!(loader.state().page(), 1);

        release.send(()).unwrap();
        assert!(loader.wait(WAIT));
        assert_eq!(service.calls(), vec![(1, 40)]);
        assert_eq!(loader.state().page(), 1);
    }

    #[test]
    fn failure_on_second_page_blanks_feed() {
        let mut failures = HashMap::new();
        failures.insert(2, "Network Error".to_string());
        let (mut loader, service) = loader(MockService {
            failures,
            ..MockService::default()
        });
        loader.start();
        assert!(loader.wait(WAIT));
        assert!(loader.advance_page());
        assert!(loader.wait(WAIT));

        assert_eq!(loader.status(), FeedStatus::Failed("Network Error"));
        assert!(!loader.state().in_flight());
        assert_eq!(loader.state().records().len(), 2);
        assert_eq!(loader.state().page(), 2);

        assert!(!loader.advance_page());
        assert_eq!(loader.state().page(), 2);
        assert_eq!(service.calls().len(), 2);
    }

    #[test]
    fn empty_page_exhausts_feed() {
        let (mut loader, service) = loader(MockService {
            empty_from: Some(2),
            ..MockService::default()
        });
        loader.start();
        assert!(loader.wait(WAIT));
        assert!(loader.advance_page());
        assert!(loader.wait(WAIT));
        assert!(loader.state().exhausted());
        assert_eq!(loader.status(), FeedStatus::Ready);
        assert!(!loader.advance_page());
        assert_eq!(service.calls().len(), 2);
    }

    #[test]
    fn catalog_size_survives_pages_without_count() {
        let (mut loader, _service) = loader(MockService {
            empty_from: Some(2),
            count: Some(120),
            ..MockService::default()
        });
        assert_eq!(loader.state().catalog_size(), None);
        loader.start();
        assert!(loader.wait(WAIT));
        assert_eq!(loader.state().catalog_size(), Some(120));
        assert!(loader.advance_page());
        assert!(loader.wait(WAIT));
        assert_eq!(loader.state().catalog_size(), Some(120));
    }

    #[test]
    fn shutdown_discards_late_delivery() {
        let (release, gate) = unbounded();
        let (mut loader, _service) = loader(MockService {
            gate: Some(gate),
            ..MockService::default()
        });
        loader.start();
        loader.shutdown();
        release.send(()).unwrap();
        assert!(!loader.wait(Duration::from_millis(200)));
        assert!(!loader.poll());
        assert!(loader.state().records().is_empty());
        assert!(!loader.advance_page());
    }

    #[test]
    fn advance_before_start_is_noop() {
        let (mut loader, service) = loader(MockService::default());
        assert!(!loader.advance_page());
        assert_eq!(loader.state().page(), 1);
        assert!(service.calls().is_empty());
    }
}
