use std::sync::Arc;

use crate::media::ControlChannel;
use crate::observability::Counters;
use crate::queue::JobStore;
use crate::search::SearchAggregator;
use crate::worker::{NowPlaying, ProgressBoard};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JobStore>,
    pub search: Arc<SearchAggregator>,
    pub progress: Arc<ProgressBoard>,
    pub now_playing: Arc<NowPlaying>,
    pub control: ControlChannel,
    pub counters: Arc<Counters>,
}

impl AppState {
    pub fn new(
        store: Arc<JobStore>,
        search: Arc<SearchAggregator>,
        progress: Arc<ProgressBoard>,
        now_playing: Arc<NowPlaying>,
        control: ControlChannel,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            store,
            search,
            progress,
            now_playing,
            control,
            counters,
        }
    }
}
