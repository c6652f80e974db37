#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use model_observer::{
    Event, FieldDescriptor, HandlerTable, HookFuture, InMemoryStore, Model, ModelManager, ModelMeta,
    ModelObserver, ObserverError, PriorState, SignalBus, SignalMap,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(model_observer::logging::init_tracing);
}

static ARTICLE_FIELDS: [FieldDescriptor; 5] = [
    FieldDescriptor::concrete("id"),
    FieldDescriptor::concrete("title"),
    FieldDescriptor::concrete("status"),
    FieldDescriptor::many_to_many("tags"),
    FieldDescriptor::reverse("comments"),
];

static ARTICLE_META: ModelMeta = ModelMeta::new("Article", "articles", &ARTICLE_FIELDS);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip)]
    pub prior: PriorState<Article>,
}

impl Article {
    pub fn draft(title: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            status: "draft".to_string(),
            tags: Vec::new(),
            prior: PriorState::new(),
        }
    }
}

impl Model for Article {
    fn meta() -> &'static ModelMeta {
        &ARTICLE_META
    }

    fn pk(&self) -> Option<Uuid> {
        self.id
    }

    fn set_pk(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn prior_state(&self) -> &PriorState<Self> {
        &self.prior
    }

    fn prior_state_mut(&mut self) -> &mut PriorState<Self> {
        &mut self.prior
    }
}

/// Observer that records every hook it runs
#[derive(Default)]
pub struct ArticleObserver {
    calls: Mutex<Vec<String>>,
    extension: SignalMap,
    reject_titles: Option<String>,
}

impl ArticleObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_signals(extension: SignalMap) -> Arc<Self> {
        Arc::new(Self {
            extension,
            ..Self::default()
        })
    }

    /// Observer whose `title_changed` hook rejects the given title
    pub fn rejecting_title(title: &str) -> Arc<Self> {
        Arc::new(Self {
            reject_titles: Some(title.to_string()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, hook: &str) -> usize {
        self.calls().iter().filter(|call| call.split(':').next() == Some(hook)).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn status_changed<'a>(&'a self, event: &'a mut Event<Article>) -> HookFuture<'a> {
        Box::pin(async move {
            let article = event.instance()?;
            let before = article
                .prior
                .pre_save_instance()
                .map(|prior| prior.status.clone())
                .unwrap_or_default();
            self.record(format!("status_changed:{}->{}", before, article.status));
            Ok(())
        })
    }

    fn title_changed<'a>(&'a self, event: &'a mut Event<Article>) -> HookFuture<'a> {
        Box::pin(async move {
            let article = event.instance()?;
            if self.reject_titles.as_deref() == Some(article.title.as_str()) {
                return Err(ObserverError::hook("title_changed", "title is not allowed"));
            }
            self.record(format!("title_changed:{}", article.title));
            Ok(())
        })
    }

    fn tags_changed<'a>(&'a self, _event: &'a mut Event<Article>) -> HookFuture<'a> {
        Box::pin(async move {
            self.record("tags_changed".to_string());
            Ok(())
        })
    }

    fn guard_delete<'a>(&'a self, event: &'a mut Event<Article>) -> HookFuture<'a> {
        Box::pin(async move {
            let article = event.instance()?;
            self.record(format!("guard_delete:{}", article.title));
            Ok(())
        })
    }

    fn stamp_title<'a>(&'a self, event: &'a mut Event<Article>) -> HookFuture<'a> {
        Box::pin(async move {
            let article = event.instance_mut()?;
            article.title = article.title.trim().to_string();
            self.record("stamp_title".to_string());
            Ok(())
        })
    }
}

#[async_trait::async_trait]
impl ModelObserver<Article> for ArticleObserver {
    fn signals(&self) -> SignalMap {
        self.extension.clone()
    }

    fn handlers(&self) -> HandlerTable<Self, Article> {
        HandlerTable::new()
            .with("status_changed", Self::status_changed)
            .with("title_changed", Self::title_changed)
            .with("tags_changed", Self::tags_changed)
            .with("guard_delete", Self::guard_delete)
            .with("stamp_title", Self::stamp_title)
    }

    async fn on_create(&self, event: &mut Event<Article>) -> Result<(), ObserverError> {
        let article = event.instance()?;
        self.record(format!("on_create:{}", article.title));
        Ok(())
    }

    async fn on_update(&self, event: &mut Event<Article>) -> Result<(), ObserverError> {
        let article = event.instance()?;
        self.record(format!("on_update:{}", article.title));
        Ok(())
    }

    async fn on_delete(&self, event: &mut Event<Article>) -> Result<(), ObserverError> {
        let article = event.instance()?;
        self.record(format!("on_delete:{}", article.title));
        Ok(())
    }
}

/// A manager over a fresh store and a private bus
pub fn article_manager() -> (ModelManager<Article>, Arc<InMemoryStore<Article>>) {
    init_tracing();
    let store = Arc::new(InMemoryStore::<Article>::new());
    let manager = ModelManager::new(store.clone(), SignalBus::new());
    (manager, store)
}
