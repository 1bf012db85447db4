//! Fakes and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Notify, Semaphore};

use folio::config::{PresetCatalog, Settings};
use folio::import::{PdfBackend, PdfDocument, PdfError};
use folio::jobs::{Capabilities, ChannelEventSink, JobCoordinator, JobEvent, JobEventKind};
use folio::providers::{BackendKind, Provider, ProviderError, ProviderRequest, Router};
use folio::store::{DocumentStore, DocumentStoreHandle};

type Respond = dyn Fn(&ProviderRequest) -> String + Send + Sync;

/// Provider answering from a closure, optionally held back by a gate.
pub struct FakeProvider {
    kind: BackendKind,
    respond: Box<Respond>,
    gate: Option<Arc<Semaphore>>,
    pub calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(
        kind: BackendKind,
        respond: impl Fn(&ProviderRequest) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            respond: Box::new(respond),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Each call waits for one permit from `gate` before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        String::new()
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        Ok((self.respond)(request))
    }
}

/// Gemini stand-in answering HTR requests with the image's file name.
pub fn htr_provider(tag: &'static str) -> FakeProvider {
    FakeProvider::new(BackendKind::Gemini, move |request| {
        let name = request
            .image
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("Transcription:\n{} {}", tag, name)
    })
}

/// Holds the renderer inside one page until the test releases it.
pub struct PageGate {
    page: u32,
    pub entered: Notify,
    release: Mutex<mpsc::Receiver<()>>,
}

impl PageGate {
    pub fn new(page: u32) -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let gate = Arc::new(Self {
            page,
            entered: Notify::new(),
            release: Mutex::new(rx),
        });
        (gate, tx)
    }

    fn hold(&self, page: u32) {
        if page != self.page {
            return;
        }
        self.entered.notify_one();
        if let Ok(rx) = self.release.lock() {
            let _ = rx.recv();
        }
    }
}

/// In-memory PDF whose listed pages fail or panic while rendering.
#[derive(Clone, Default)]
pub struct FakePdf {
    pub pages: u32,
    pub failing: Vec<u32>,
    pub panicking: Vec<u32>,
    pub gate: Option<Arc<PageGate>>,
}

impl FakePdf {
    pub fn new(pages: u32) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn failing(mut self, pages: Vec<u32>) -> Self {
        self.failing = pages;
        self
    }

    pub fn panicking(mut self, pages: Vec<u32>) -> Self {
        self.panicking = pages;
        self
    }

    pub fn gated(mut self, gate: Arc<PageGate>) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl PdfBackend for FakePdf {
    fn open(&self, path: &Path) -> Result<Arc<dyn PdfDocument>, PdfError> {
        if !path.is_file() {
            return Err(PdfError::Open(format!("{} does not exist", path.display())));
        }
        Ok(Arc::new(self.clone()))
    }
}

impl PdfDocument for FakePdf {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn render_page(&self, page: u32, _dpi: u32, dest: &Path) -> Result<(), PdfError> {
        if let Some(gate) = &self.gate {
            gate.hold(page);
        }
        if self.panicking.contains(&page) {
            panic!("renderer crashed on page {}", page);
        }
        if self.failing.contains(&page) {
            return Err(PdfError::Page {
                page,
                message: "corrupt page stream".to_string(),
            });
        }
        std::fs::write(dest, format!("jpeg {}", page))?;
        Ok(())
    }

    fn page_text(&self, page: u32) -> Result<String, PdfError> {
        Ok(format!("embedded text {}", page))
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub coordinator: JobCoordinator,
    pub events: UnboundedReceiver<JobEvent>,
}

impl Harness {
    pub fn images_dir(&self) -> PathBuf {
        self.dir.path().join("images")
    }

    /// Drain events received so far.
    pub fn drain(&mut self) -> Vec<JobEventKind> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event.kind);
        }
        out
    }

    /// Wait for the next progress event.
    pub async fn next_progress(&mut self) -> usize {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                .await
                .expect("timed out waiting for progress")
                .expect("event channel closed");
            if let JobEventKind::Progress(progress) = event.kind {
                return progress.completed;
            }
        }
    }
}

pub struct HarnessBuilder {
    pages: u32,
    concurrency: usize,
    providers: Vec<Arc<dyn Provider>>,
    pdf: FakePdf,
}

impl HarnessBuilder {
    pub fn new(pages: u32) -> Self {
        Self {
            pages,
            concurrency: 4,
            providers: Vec::new(),
            pdf: FakePdf::new(0),
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn pdf(mut self, pdf: FakePdf) -> Self {
        self.pdf = pdf;
        self
    }

    /// Project with `pages` image pages named `0001.jpg`, `0002.jpg`, ...
    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();

        let mut store = DocumentStore::with_root(dir.path());
        for n in 1..=self.pages {
            let path = images.join(format!("{:04}.jpg", n));
            std::fs::write(&path, b"jpeg").unwrap();
            store.push_image(&path);
        }

        let mut router = Router::new(Duration::from_secs(5), Duration::from_millis(1));
        for provider in self.providers {
            router.register(provider);
        }

        let settings = Settings {
            concurrency: self.concurrency,
            ..Settings::default()
        };
        let (sink, events) = ChannelEventSink::channel();
        let caps = Capabilities {
            store: DocumentStoreHandle::new(store),
            presets: Arc::new(PresetCatalog::default()),
            router: Arc::new(router),
            pdf: Arc::new(self.pdf),
            events: Arc::new(sink),
        };

        Harness {
            dir,
            coordinator: JobCoordinator::new(caps, &settings),
            events,
        }
    }
}
