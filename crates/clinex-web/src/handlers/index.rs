//! Landing page with an interactive extraction form.

use axum::{extract::State, response::Html};
use minijinja::context;

use crate::error::ApiError;
use crate::state::{SharedState, INDEX_TEMPLATE};

/// GET /: demo page
pub async fn index(State(state): State<SharedState>) -> Result<Html<String>, ApiError> {
    let template = state.templates.get_template(INDEX_TEMPLATE)?;
    let page = template.render(context! {
        model_id => state.model_id.as_str(),
        model_loaded => state.service.handle().is_loaded(),
        threshold => state.service.default_threshold().to_string(),
        version => env!("CARGO_PKG_VERSION"),
    })?;
    Ok(Html(page))
}
