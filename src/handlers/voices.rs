//! Voice catalog endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::core::audio::AudioFormat;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VoicesQuery {
    /// Restrict to one provider id.
    pub provider: Option<String>,
    /// Restrict to one BCP-47 language tag.
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub language: String,
    pub provider: String,
    pub sample_rate_hz: u32,
    pub supported_formats: Vec<AudioFormat>,
}

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub voices: Vec<Voice>,
}

/// List every voice the gateway can synthesize with, across providers.
pub async fn list_voices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VoicesQuery>,
) -> Json<VoicesResponse> {
    let supported_formats = state.transcoder.supported_formats();
    let voices = state
        .registry
        .voices()
        .iter()
        .filter(|entry| {
            query
                .provider
                .as_deref()
                .is_none_or(|p| entry.provider_id == p)
        })
        .filter(|entry| {
            query
                .language
                .as_deref()
                .is_none_or(|l| entry.voice.language == l)
        })
        .map(|entry| Voice {
            id: entry.voice.id.clone(),
            name: entry.voice.name.clone(),
            language: entry.voice.language.clone(),
            provider: entry.provider_id.clone(),
            sample_rate_hz: entry.voice.sample_rate_hz,
            supported_formats: supported_formats.clone(),
        })
        .collect();
    Json(VoicesResponse { voices })
}
