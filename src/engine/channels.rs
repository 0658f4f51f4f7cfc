use std::collections::HashMap;

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use parking_lot::Mutex;
use tracing::debug;

use crate::engine::errors::ChannelError;
use crate::engine::query_engine::{BatchStream, batches_stream};
use crate::engine::registry::EvictionListener;

enum ChannelState {
    Ready(Vec<RecordBatch>),
    Consumed,
}

struct StreamChannel {
    owner: String,
    schema: SchemaRef,
    state: ChannelState,
}

#[derive(Default)]
struct Channels {
    by_ticket: HashMap<String, StreamChannel>,
    by_owner: HashMap<String, Vec<String>>,
}

/// Ticket-addressed, single-reader stream channels, each owned by a result set handle.
///
/// A channel can be taken exactly once; afterwards it stays registered in the consumed
/// state so a repeated fetch is reported as such rather than as an unknown ticket.
/// Channels live until their owner fails or is evicted from the registry.
#[derive(Default)]
pub struct StreamChannelStore {
    inner: Mutex<Channels>,
}

impl StreamChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        owner: &str,
        ticket: &str,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock();
        if inner.by_ticket.contains_key(ticket) {
            return Err(ChannelError::DuplicateTicket(ticket.to_string()));
        }
        inner.by_ticket.insert(
            ticket.to_string(),
            StreamChannel {
                owner: owner.to_string(),
                schema,
                state: ChannelState::Ready(batches),
            },
        );
        inner
            .by_owner
            .entry(owner.to_string())
            .or_default()
            .push(ticket.to_string());
        debug!(target: "glide::channels", owner, ticket, "Channel registered");
        Ok(())
    }

    /// Hands out the channel's schema and batches, moving it to the consumed state.
    pub fn take(&self, ticket: &str) -> Result<(SchemaRef, BatchStream), ChannelError> {
        let mut inner = self.inner.lock();
        let channel = inner
            .by_ticket
            .get_mut(ticket)
            .ok_or_else(|| ChannelError::UnknownTicket(ticket.to_string()))?;
        match std::mem::replace(&mut channel.state, ChannelState::Consumed) {
            ChannelState::Ready(batches) => {
                debug!(target: "glide::channels", owner = %channel.owner, ticket, "Channel consumed");
                Ok((channel.schema.clone(), batches_stream(batches)))
            }
            ChannelState::Consumed => Err(ChannelError::AlreadyConsumed(ticket.to_string())),
        }
    }

    pub fn is_consumed(&self, ticket: &str) -> Result<bool, ChannelError> {
        let inner = self.inner.lock();
        let channel = inner
            .by_ticket
            .get(ticket)
            .ok_or_else(|| ChannelError::UnknownTicket(ticket.to_string()))?;
        Ok(matches!(channel.state, ChannelState::Consumed))
    }

    /// Forgets every channel of `owner`, consumed or not. Returns how many were dropped.
    pub fn drop_owner(&self, owner: &str) -> usize {
        let mut inner = self.inner.lock();
        let Some(tickets) = inner.by_owner.remove(owner) else {
            return 0;
        };
        for ticket in &tickets {
            inner.by_ticket.remove(ticket);
        }
        debug!(target: "glide::channels", owner, dropped = tickets.len(), "Channels dropped");
        tickets.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_ticket.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EvictionListener for StreamChannelStore {
    fn evicted(&self, handle: &str) {
        self.drop_owner(handle);
    }
}
