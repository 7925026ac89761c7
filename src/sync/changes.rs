//! Change Feed Consumer

use super::{bootstrap, SyncContext, SyncState};
use crate::error::SyncError;
use crate::frontmatter::{upsert_front_matter, FrontMatterDoc};
use crate::path::StackEditPath;
use crate::tree::Lookup;
use crate::types::{ChangeEvent, Item, ItemType, DATA_ATTACHMENT, FRONTMATTER_PREFIX};
use futures::StreamExt;
use std::future::Future;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

const DESIGN_PREFIX: &str = "_design/";

/// Content event waiting for its file to appear on the tree
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PendingRetry {
    #[default]
    None,
    Content {
        doc_id: String,
        item: Item,
        /// Frontmatter already written on the first attempt
        frontmatter: Option<FrontMatterDoc>,
    },
}

/// What handling one event did
#[derive(Debug, PartialEq, Eq)]
pub enum EventOutcome {
    /// Body written to the new path
    Written(PathBuf),
    /// File not on the tree yet; kept as the pending retry
    Deferred(String),
    /// Model rebuilt; carries the outcome of the replayed retry, if any
    Rebuilt { replayed: Option<Box<EventOutcome>> },
    Ignored,
}

/// Applies change events to the model and the content directory, one at a time
pub struct ChangeConsumer {
    ctx: SyncContext,
    state: SyncState,
    pending: PendingRetry,
    since: String,
}

impl ChangeConsumer {
    pub fn new(ctx: SyncContext, state: SyncState) -> Self {
        Self {
            ctx,
            state,
            pending: PendingRetry::None,
            since: "now".to_string(),
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn pending(&self) -> &PendingRetry {
        &self.pending
    }

    /// Sequence the next subscription starts after.
    pub fn since(&self) -> &str {
        &self.since
    }

    /// Dispatch one event by the type of its item.
    pub async fn handle_event(&mut self, event: ChangeEvent) -> Result<EventOutcome, SyncError> {
        if event.id.starts_with(FRONTMATTER_PREFIX) || event.id.starts_with(DESIGN_PREFIX) {
            return Ok(EventOutcome::Ignored);
        }
        let item = event.document().and_then(|doc| doc.item);
        match item {
            Some(item) if item.item_type == ItemType::Content => {
                self.process_content(event.id, item, None).await
            }
            Some(item) if item.item_type.is_structural() => {
                debug!(item_id = %item.id, "Structural change");
                self.rebuild().await
            }
            None if event.deleted => {
                debug!(doc_id = %event.id, "Deleted document");
                self.rebuild().await
            }
            other => {
                info!(doc_id = %event.id, item_type = ?other.map(|item| item.item_type), "Unknown change");
                Ok(EventOutcome::Ignored)
            }
        }
    }

    async fn process_content(
        &mut self,
        doc_id: String,
        item: Item,
        upserted: Option<FrontMatterDoc>,
    ) -> Result<EventOutcome, SyncError> {
        let store = self.ctx.store();
        let attachment = store.get_attachment(&doc_id, DATA_ATTACHMENT).await?;
        self.state.index.update_content(&item, &attachment.etag, &doc_id);
        debug!(
            hashes = self.state.index.hash_count(),
            etags = self.state.index.etag_count(),
            "Index sizes"
        );

        let body = attachment.text();
        let frontmatter = match (upserted, item.hash) {
            (Some(doc), _) => Some(doc),
            (None, Some(hash)) => Some(upsert_front_matter(store, &doc_id, hash, &body).await?),
            (None, None) => None,
        };

        let file_id = item.file_id().to_string();
        let names = match self.state.tree.names_from_id(&file_id) {
            Lookup::Resolved(names) => names,
            Lookup::Unresolved(id) => {
                info!(doc_id = %doc_id, file_id = %id, "Deferring content until its file appears");
                if let PendingRetry::Content { doc_id: dropped, .. } = &self.pending {
                    debug!(dropped = %dropped, "Replacing pending retry");
                }
                self.pending = PendingRetry::Content {
                    doc_id,
                    item,
                    frontmatter,
                };
                return Ok(EventOutcome::Deferred(id));
            }
        };

        self.state
            .tree
            .update_content(&file_id, item.hash, &attachment.etag, &doc_id);
        if let Some(doc) = &frontmatter {
            if let Err(e) = self.state.tree.append_frontmatter_note(doc) {
                debug!(error = %e, "Frontmatter note not attached");
            }
        }

        let root = &self.ctx.site.content_dir;
        let path = StackEditPath::new(names, attachment.etag.clone(), Some(doc_id))?;
        let pruned = path.prune_siblings(root).await;
        let written = path.write_markdown(root, &attachment.body).await?;
        info!(path = %written.display(), pruned, "Wrote content");
        Ok(EventOutcome::Written(written))
    }

    /// Re-run bootstrap, then replay the pending retry.
    async fn rebuild(&mut self) -> Result<EventOutcome, SyncError> {
        let (state, report) = bootstrap(&self.ctx).await?;
        debug!(?report, "Rebuilt after structural change");
        self.state = state;

        let replayed = match std::mem::take(&mut self.pending) {
            PendingRetry::None => None,
            PendingRetry::Content {
                doc_id,
                item,
                frontmatter,
            } => Some(Box::new(self.process_content(doc_id, item, frontmatter).await?)),
        };
        Ok(EventOutcome::Rebuilt { replayed })
    }

    /// Follow the change feed until `shutdown` resolves.
    ///
    /// Shutdown is only observed between events. A closed or failed feed is
    /// resubscribed from the last seen sequence. Returns the number of events
    /// handled.
    pub async fn run<F>(&mut self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut handled = 0;
        loop {
            let subscription = tokio::select! {
                _ = &mut shutdown => return handled,
                subscription = self.ctx.store.changes(&self.since) => subscription,
            };
            match subscription {
                Ok(mut feed) => {
                    info!(since = %self.since, "Following changes");
                    loop {
                        let next = tokio::select! {
                            _ = &mut shutdown => return handled,
                            next = feed.next() => next,
                        };
                        let event = match next {
                            Some(Ok(event)) => event,
                            Some(Err(e)) => {
                                warn!(error = %e, "Change feed failed");
                                break;
                            }
                            None => {
                                debug!("Change feed closed");
                                break;
                            }
                        };
                        if let Some(seq) = seq_string(&event.seq) {
                            self.since = seq;
                        }
                        let doc_id = event.id.clone();
                        match self.handle_event(event).await {
                            Ok(outcome) => debug!(doc_id = %doc_id, ?outcome, "Handled change"),
                            Err(e) => error!(doc_id = %doc_id, error = %e, "Failed to handle change"),
                        }
                        handled += 1;
                    }
                }
                Err(e) => warn!(error = %e, "Failed to subscribe to changes"),
            }

            tokio::select! {
                _ = &mut shutdown => return handled,
                _ = tokio::time::sleep(self.ctx.settings.reconnect_delay()) => {}
            }
        }
    }
}

fn seq_string(seq: &serde_json::Value) -> Option<String> {
    match seq {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
