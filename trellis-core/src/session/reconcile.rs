//! Island reconciliation.
//!
//! After an event has propagated through the graph, every registered island
//! is re-rendered and its text compared with the baseline the client holds.
//! Only islands whose text changed produce a patch. Invalidation is coarse:
//! every island renders on every pass, whether or not its inputs changed.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

use super::{RenderFn, Session};
use crate::error::panic_message;
use crate::protocol::ServerMessage;

impl Session {
    /// Re-render every island and return patches for the changed ones, in
    /// registration order. Baselines are updated for every patch returned.
    pub fn reconcile(&self) -> Vec<ServerMessage> {
        let renders: Vec<(String, RenderFn)> = self
            .inner
            .registrations
            .lock()
            .islands
            .iter()
            .filter_map(|(id, island)| Some((id.clone(), island.render.clone()?)))
            .collect();

        let mut patches = Vec::new();
        for (id, render) in renders {
            let html = match catch_unwind(AssertUnwindSafe(|| {
                self.runtime().untrack(|| render().render())
            })) {
                Ok(html) => html,
                Err(payload) => {
                    warn!(
                        session = %self.id(),
                        island = %id,
                        message = %panic_message(payload.as_ref()),
                        "island render failed, skipped"
                    );
                    continue;
                }
            };

            let mut registrations = self.inner.registrations.lock();
            // Reset between snapshot and render.
            let Some(island) = registrations.islands.get_mut(&id) else {
                continue;
            };
            if island.baseline == html {
                continue;
            }
            island.baseline = html.clone();
            patches.push(ServerMessage::Patch { island: id, html });
        }

        debug!(session = %self.id(), patches = patches.len(), "reconciled");
        patches
    }

    /// Reconcile and send the resulting patches. Returns how many were sent.
    pub fn reconcile_and_flush(&self) -> usize {
        let patches = self.reconcile();
        self.flush(patches)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::protocol::{Codec, Frame, ServerMessage};
    use crate::session::{ChannelTransport, Session};
    use crate::view::{el, text};

    #[test]
    fn unchanged_islands_produce_nothing() {
        let session = Session::ephemeral();
        let count = session.runtime().signal(0);

        let _ = session.island("counter", text(count.get()));
        session.register_island("counter", {
            let count = count.clone();
            move || text(count.get())
        });

        assert!(session.reconcile().is_empty());
    }

    #[test]
    fn changed_island_produces_one_patch_and_moves_baseline() {
        let session = Session::ephemeral();
        let count = session.runtime().signal(0);

        let _ = session.island("counter", text(count.get()));
        session.register_island("counter", {
            let count = count.clone();
            move || el("b").child(text(count.get())).into()
        });
        session.register_island("static", || text("fixed"));
        let _ = session.island("static", text("fixed"));

        count.set(1);
        let patches = session.reconcile();
        assert_eq!(
            patches,
            vec![ServerMessage::Patch {
                island: "counter".into(),
                html: "<b>1</b>".into(),
            }]
        );
        assert_eq!(session.baseline("counter").as_deref(), Some("<b>1</b>"));

        assert!(session.reconcile().is_empty());
    }

    #[test]
    fn patches_follow_registration_order() {
        let session = Session::ephemeral();
        let count = session.runtime().signal(0);
        for id in ["second", "first"] {
            let count = count.clone();
            session.register_island(id, move || text(count.get()));
        }

        let ids: Vec<_> = session
            .reconcile()
            .into_iter()
            .map(|patch| match patch {
                ServerMessage::Patch { island, .. } => island,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec!["second", "first"]);
    }

    #[test]
    fn panicking_render_is_skipped() {
        let session = Session::ephemeral();
        session.register_island("broken", || panic!("render failed"));
        session.register_island("fine", || text("ok"));

        let patches = session.reconcile();
        assert_eq!(patches.len(), 1);
        assert_eq!(session.baseline("broken").as_deref(), Some(""));
    }

    #[test]
    fn reconcile_and_flush_sends_patches() {
        let (transport, mut rx) = ChannelTransport::pair();
        let session = Session::durable(Arc::new(transport));
        session.register_island("greeting", || text("hi"));

        assert_eq!(session.reconcile_and_flush(), 1);
        let Frame::Text(json) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        assert_eq!(session.codec(), Codec::Json);
        assert!(json.contains(r#""island":"greeting""#));
    }
}
