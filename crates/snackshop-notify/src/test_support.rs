//! Scripted backend and recording sink for store/dispatcher tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};

use snackshop_shared::api::{NotificationFilter, NotificationPage};
use snackshop_shared::schemas::Notification;

use crate::api::NotificationBackend;
use crate::sink::AlertSink;

/// Backend returning a scripted sequence of list results.
#[derive(Default)]
pub struct ScriptedBackend {
    /// Pages handed out in order; `None` entries fail the request.
    pages: Mutex<VecDeque<Option<NotificationPage>>>,
    pub fail_mark_read: AtomicBool,
    pub fail_mark_all: AtomicBool,
    pub fetch_calls: AtomicUsize,
    pub mark_read_calls: Mutex<Vec<String>>,
    pub mark_all_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn with_pages(pages: Vec<Option<NotificationPage>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            ..Default::default()
        }
    }
}

impl NotificationBackend for ScriptedBackend {
    fn fetch_notifications<'a>(
        &'a self,
        _filter: &'a NotificationFilter,
    ) -> Pin<Box<dyn Future<Output = Result<NotificationPage>> + Send + 'a>> {
        Box::pin(async move {
            self.fetch_calls.fetch_add(1, Ordering::Relaxed);
            match self.pages.lock().unwrap().pop_front() {
                Some(Some(page)) => Ok(page),
                _ => bail!("scripted fetch failure"),
            }
        })
    }

    fn mark_read<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.mark_read_calls.lock().unwrap().push(id.to_string());
            if self.fail_mark_read.load(Ordering::Relaxed) {
                bail!("scripted mark-read failure");
            }
            Ok(())
        })
    }

    fn mark_all_read<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.mark_all_calls.fetch_add(1, Ordering::Relaxed);
            if self.fail_mark_all.load(Ordering::Relaxed) {
                bail!("scripted mark-all-read failure");
            }
            Ok(())
        })
    }
}

/// Sink recording every side effect as a short tag.
#[derive(Default)]
pub struct RecordingSink {
    pub effects: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn effects(&self) -> Vec<String> {
        self.effects.lock().unwrap().clone()
    }

    pub fn count_of(&self, prefix: &str) -> usize {
        self.effects
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    fn record(&self, tag: String) {
        self.effects.lock().unwrap().push(tag);
    }
}

impl AlertSink for RecordingSink {
    fn announce<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.record(format!("announce:{}", notification.id));
            Ok(())
        })
    }

    fn play_chime<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.record("chime".into());
            Ok(())
        })
    }

    fn show_notification<'a>(
        &'a self,
        notification: &'a Notification,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.record(format!("show:{}", notification.id));
            Ok(())
        })
    }

    fn set_badge<'a>(
        &'a self,
        count: u64,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.record(format!("badge:{count}"));
            Ok(())
        })
    }

    fn clear_badge<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.record("clear-badge".into());
            Ok(())
        })
    }
}

/// Minimal notification fixture.
pub fn notification(id: &str, read: bool) -> Notification {
    Notification {
        id: id.into(),
        kind: Default::default(),
        title: format!("title-{id}"),
        message: format!("message-{id}"),
        read,
        created_at: 1_700_000_000_000,
        read_at: None,
        link: None,
        data: None,
    }
}
