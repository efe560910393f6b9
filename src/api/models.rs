use crate::api::ModelsResponse;

/// Shipped fallback shown when the model listing cannot be fetched.
pub const FALLBACK_MODELS: &[&str] = &[
    "dolphin-phi",
    "llama2-uncensored",
    "mistral",
    "qwen3:1.7b",
    "gemma3",
];

/// Fetches the installed model names from the chat service, in the order
/// the service reports them.
pub async fn fetch_models(client: &reqwest::Client, base_url: &str) -> Result<Vec<String>, String> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("model list request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!(
            "model list request returned status {}",
            response.status()
        ));
    }

    let parsed = response
        .json::<ModelsResponse>()
        .await
        .map_err(|e| format!("model list response was not valid JSON: {e}"))?;

    Ok(parsed.models.into_iter().map(|m| m.name).collect())
}

/// The list the session falls back to when fetching fails or returns nothing.
pub fn fallback_models() -> Vec<String> {
    FALLBACK_MODELS.iter().map(|m| m.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_list_is_nonempty_and_ordered() {
        let models = fallback_models();
        assert_eq!(models.len(), FALLBACK_MODELS.len());
        assert_eq!(models[0], "dolphin-phi");
    }
}
