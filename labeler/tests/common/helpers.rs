//! Test helpers and builder patterns for engine tests
//!
//! Engines are built from real in-memory stores, a real snapshot store in a
//! temporary directory and a scripted mock generator.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use labeler::core::PromptContext;
use labeler::services::{InMemoryAnnotationStore, InMemoryItemStore, RealStateStore};
use labeler::traits::MockGenerator;
use labeler::{LabelerError, LabelerResult, LabelingEngine, UserAnnotations};
use shared::LabelingConfig;
use tempfile::TempDir;
use tokio::sync::mpsc as async_mpsc;

use super::fixtures::TestFixtures;

pub type TestEngine = LabelingEngine<InMemoryAnnotationStore, InMemoryItemStore, MockGenerator, RealStateStore>;

/// A built engine plus the temporary directory holding its snapshot
pub struct TestHarness {
    pub engine: Arc<TestEngine>,
    pub state_path: PathBuf,
    pub dir: TempDir,
}

/// Builder pattern for creating test engines with sensible defaults
pub struct EngineBuilder {
    config: LabelingConfig,
    annotations: Vec<(String, String, String, String)>,
    items: Vec<(String, String)>,
    generator: Option<MockGenerator>,
    dir: Option<TempDir>,
}

impl EngineBuilder {
    /// Default dataset, config and a generator answering "positive" at 0.9
    pub fn new() -> Self {
        Self {
            config: TestFixtures::config(),
            annotations: TestFixtures::annotations(),
            items: TestFixtures::items(),
            generator: None,
            dir: None,
        }
    }

    pub fn with_config<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut LabelingConfig),
    {
        setup(&mut self.config);
        self
    }

    pub fn with_generator(mut self, generator: MockGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace all human annotations
    pub fn with_annotations(mut self, votes: &[(&str, &str, &str, &str)]) -> Self {
        self.annotations = votes
            .iter()
            .map(|(u, i, s, l)| (u.to_string(), i.to_string(), s.to_string(), l.to_string()))
            .collect();
        self
    }

    /// Replace all items; text is derived from the id
    pub fn with_item_ids(mut self, ids: &[&str]) -> Self {
        self.items = ids.iter().map(|id| (id.to_string(), TestFixtures::text_for(id))).collect();
        self
    }

    pub fn with_item(mut self, id: &str, text: &str) -> Self {
        self.items.push((id.to_string(), text.to_string()));
        self
    }

    /// Add `count` unannotated items after the defaults
    pub fn with_extra_docs(mut self, count: usize) -> Self {
        let start = self.items.len();
        for i in 0..count {
            let id = format!("extra_{}", start + i);
            let text = TestFixtures::text_for(&id);
            self.items.push((id, text));
        }
        self
    }

    /// Reuse an existing snapshot directory, e.g. to test restore
    pub fn with_state_dir(mut self, dir: TempDir) -> Self {
        self.dir = Some(dir);
        self
    }

    pub fn build(self) -> TestHarness {
        let mut users: BTreeMap<String, UserAnnotations> = BTreeMap::new();
        for (user, instance, schema, label) in self.annotations {
            users
                .entry(user)
                .or_default()
                .entry(instance)
                .or_insert_with(HashMap::new)
                .insert(schema, label);
        }

        let dir = self
            .dir
            .unwrap_or_else(|| TempDir::new().expect("Failed to create temp dir"));
        let state_path = dir.path().join("icl_labeler_state.json");

        let engine = LabelingEngine::new(
            self.config,
            InMemoryAnnotationStore::from_map(users),
            InMemoryItemStore::from_pairs(self.items),
            self.generator
                .unwrap_or_else(|| TestHelpers::fixed_generator("positive", 0.9)),
            RealStateStore::new(&state_path),
        );

        TestHarness {
            engine: Arc::new(engine),
            state_path,
            dir,
        }
    }
}

/// Helper functions for common test operations
pub struct TestHelpers;

impl TestHelpers {
    /// Available generator with a reply computed from each context
    pub fn scripted_generator<F>(reply: F) -> MockGenerator
    where
        F: Fn(&PromptContext) -> LabelerResult<String> + Send + 'static,
    {
        let mut generator = MockGenerator::new();
        generator.expect_is_available().return_const(true);
        generator
            .expect_model_name()
            .returning(|| Some(TestFixtures::MODEL.to_string()));
        generator.expect_generate().returning(move |context| reply(context));
        generator
    }

    pub fn fixed_generator(label: &str, confidence: f64) -> MockGenerator {
        let reply = TestFixtures::reply(label, confidence);
        Self::scripted_generator(move |_| Ok(reply.clone()))
    }

    /// Confidence chosen per target text; unknown texts get 0.9
    pub fn confidence_by_text(confidences: &[(&str, f64)]) -> MockGenerator {
        let table: HashMap<String, f64> = confidences
            .iter()
            .map(|(id, c)| (TestFixtures::text_for(id), *c))
            .collect();
        Self::scripted_generator(move |context| {
            let confidence = table.get(&context.target_text).copied().unwrap_or(0.9);
            Ok(TestFixtures::reply("positive", confidence))
        })
    }

    /// Answers "positive" at 0.9 after blocking the calling thread for `delay`
    pub fn slow_generator(delay: Duration) -> MockGenerator {
        let reply = TestFixtures::reply("positive", 0.9);
        Self::scripted_generator(move |_| {
            std::thread::sleep(delay);
            Ok(reply.clone())
        })
    }

    /// Generator that holds the call for `blocked_id` until the gate opens
    ///
    /// Every other target answers "positive" at 0.9 straight away.
    pub fn gated_generator(blocked_id: &str) -> (MockGenerator, GeneratorGate) {
        let (entered_tx, entered_rx) = async_mpsc::unbounded_channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let blocked_text = TestFixtures::text_for(blocked_id);

        let generator = Self::scripted_generator(move |context| {
            if context.target_text == blocked_text {
                let _ = entered_tx.send(());
                let receiver = release_rx.lock().unwrap();
                if receiver.recv_timeout(Duration::from_secs(5)).is_err() {
                    return Err(LabelerError::store("gate never opened"));
                }
            }
            Ok(TestFixtures::reply("positive", 0.9))
        });

        let gate = GeneratorGate {
            entered: entered_rx,
            release: release_tx,
        };
        (generator, gate)
    }

    pub fn unavailable_generator() -> MockGenerator {
        let mut generator = MockGenerator::new();
        generator.expect_is_available().return_const(false);
        generator.expect_model_name().returning(|| None);
        generator.expect_generate().never();
        generator
    }

    pub fn failing_generator() -> MockGenerator {
        Self::scripted_generator(|_| Err(LabelerError::store("model endpoint refused the request")))
    }

    /// Harness with examples already mined
    pub async fn refreshed(builder: EngineBuilder) -> TestHarness {
        let harness = builder.build();
        harness
            .engine
            .refresh_examples()
            .await
            .expect("refresh should succeed");
        harness
    }
}

/// Control side of [`TestHelpers::gated_generator`]
pub struct GeneratorGate {
    entered: async_mpsc::UnboundedReceiver<()>,
    release: mpsc::Sender<()>,
}

impl GeneratorGate {
    /// Wait until the blocked call is inside the generator
    pub async fn wait_until_entered(&mut self) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.recv())
            .await
            .expect("generator should be called")
            .expect("generator dropped");
    }

    pub fn release(&self) {
        let _ = self.release.send(());
    }
}
