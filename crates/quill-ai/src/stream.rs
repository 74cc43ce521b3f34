//! Streaming types shared by all provider adapters

use crate::{Result, types::StreamEvent};
use futures::Stream;
use std::pin::Pin;

/// A finite stream of normalized provider events.
///
/// Not restartable: retrying a turn requires a fresh `stream_chat` call.
/// Mid-stream transport failures surface as `Err` items and are fatal to the
/// turn.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;
