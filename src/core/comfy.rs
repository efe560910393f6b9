//! Image generation through a local ComfyUI-compatible service.
//!
//! A job loads the configured workflow template, injects the prompt into
//! the positive text node, queues it with `POST /prompt`, then polls
//! `GET /history/{prompt_id}` until an output image appears and downloads
//! it via `GET /view`. Jobs report through the same bounded event queue as
//! chat streams: `Progress` notes while waiting, one `Token` carrying the
//! saved path, then `End`. The prompt may carry an `ar-<w>:<h>` tag to
//! override the latent image dimensions; the tag is stripped before
//! injection.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::chat_stream::StreamMessage;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const JOB_TIMEOUT: Duration = Duration::from_secs(600);

pub struct ImageJobParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub workflow_path: PathBuf,
    pub prompt: String,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

/// Spawns image jobs that feed the shared generation event queue.
#[derive(Clone)]
pub struct ImageService {
    tx: mpsc::Sender<(StreamMessage, u64)>,
}

impl ImageService {
    pub fn new(tx: mpsc::Sender<(StreamMessage, u64)>) -> Self {
        Self { tx }
    }

    pub fn spawn_job(&self, params: ImageJobParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let cancel_token = params.cancel_token.clone();
            let stream_id = params.stream_id;
            tokio::select! {
                _ = run_image_job(&tx, params) => {}
                _ = cancel_token.cancelled() => {
                    debug!(stream_id, "image job cancelled");
                }
            }
        });
    }
}

async fn run_image_job(tx: &mpsc::Sender<(StreamMessage, u64)>, params: ImageJobParams) {
    let stream_id = params.stream_id;
    if let Err(message) = drive_image_job(tx, params).await {
        let _ = tx.send((StreamMessage::Error(message), stream_id)).await;
        let _ = tx.send((StreamMessage::End, stream_id)).await;
    }
}

async fn drive_image_job(
    tx: &mpsc::Sender<(StreamMessage, u64)>,
    params: ImageJobParams,
) -> Result<(), String> {
    let ImageJobParams {
        client,
        base_url,
        workflow_path,
        prompt,
        cancel_token: _,
        stream_id,
    } = params;

    let template = {
        let path = workflow_path.clone();
        tokio::task::spawn_blocking(move || std::fs::read_to_string(&path))
            .await
            .map_err(|e| format!("workflow read task failed: {e}"))?
            .map_err(|e| format!("cannot read workflow {}: {e}", workflow_path.display()))?
    };

    let mut workflow: Value = serde_json::from_str(&template)
        .map_err(|e| format!("workflow {} is not valid JSON: {e}", workflow_path.display()))?;

    let (prompt, dimensions) = strip_aspect_override(&prompt);
    let seed: i64 = rand::thread_rng().gen_range(0..i64::MAX);
    inject_prompt(&mut workflow, &prompt, dimensions, seed);

    let client_id = format!("sotto-{:016x}", rand::thread_rng().gen::<u64>());
    let base = base_url.trim_end_matches('/');

    let queued = client
        .post(format!("{base}/prompt"))
        .json(&json!({ "prompt": workflow, "client_id": client_id }))
        .send()
        .await
        .map_err(|e| format!("image service unreachable: {e}"))?;

    if !queued.status().is_success() {
        let body = queued.text().await.unwrap_or_else(|_| "<no body>".into());
        return Err(format!("image service rejected the workflow: {body}"));
    }

    let prompt_id = queued
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| v.get("prompt_id").and_then(|p| p.as_str()).map(str::to_owned))
        .ok_or_else(|| "image service response had no prompt_id".to_string())?;

    debug!(stream_id, %prompt_id, "image job queued");
    let _ = tx
        .send((StreamMessage::Progress("queued".to_string()), stream_id))
        .await;

    let started = Instant::now();
    let image = loop {
        if started.elapsed() > JOB_TIMEOUT {
            return Err("image job timed out".to_string());
        }
        tokio::time::sleep(POLL_INTERVAL).await;

        let history = client
            .get(format!("{base}/history/{prompt_id}"))
            .send()
            .await
            .map_err(|e| format!("image service unreachable: {e}"))?
            .json::<Value>()
            .await
            .map_err(|e| format!("history response was not valid JSON: {e}"))?;

        if let Some(image) = first_output_image(&history, &prompt_id) {
            break image;
        }

        let elapsed = started.elapsed().as_secs();
        let _ = tx
            .send((
                StreamMessage::Progress(format!("generating, {elapsed}s")),
                stream_id,
            ))
            .await;
    };

    let bytes = client
        .get(format!("{base}/view"))
        .query(&[
            ("filename", image.filename.as_str()),
            ("subfolder", image.subfolder.as_str()),
            ("type", image.kind.as_str()),
        ])
        .send()
        .await
        .map_err(|e| format!("image download failed: {e}"))?
        .bytes()
        .await
        .map_err(|e| format!("image download failed: {e}"))?;

    let target = PathBuf::from(&image.filename);
    let saved = {
        let target = target.clone();
        tokio::task::spawn_blocking(move || std::fs::write(&target, &bytes).map(|_| target))
            .await
            .map_err(|e| format!("image save task failed: {e}"))?
            .map_err(|e| format!("cannot save image: {e}"))?
    };

    let _ = tx
        .send((
            StreamMessage::Token(format!("Image saved to {}", saved.display())),
            stream_id,
        ))
        .await;
    let _ = tx.send((StreamMessage::End, stream_id)).await;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OutputImage {
    filename: String,
    subfolder: String,
    kind: String,
}

fn first_output_image(history: &Value, prompt_id: &str) -> Option<OutputImage> {
    let outputs = history.get(prompt_id)?.get("outputs")?.as_object()?;
    for node_output in outputs.values() {
        let Some(images) = node_output.get("images").and_then(|v| v.as_array()) else {
            continue;
        };
        for image in images {
            if let Some(filename) = image.get("filename").and_then(|v| v.as_str()) {
                return Some(OutputImage {
                    filename: filename.to_string(),
                    subfolder: image
                        .get("subfolder")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                    kind: image
                        .get("type")
                        .and_then(|v| v.as_str())
                        .unwrap_or("output")
                        .to_string(),
                });
            }
        }
    }
    None
}

/// Pulls an `ar-<width>:<height>` token out of the prompt, if present.
pub fn strip_aspect_override(prompt: &str) -> (String, Option<(u32, u32)>) {
    let mut dimensions = None;
    let mut kept: Vec<&str> = Vec::new();

    for word in prompt.split_whitespace() {
        if dimensions.is_none() {
            if let Some(parsed) = parse_aspect_token(word) {
                dimensions = Some(parsed);
                continue;
            }
        }
        kept.push(word);
    }

    (kept.join(" "), dimensions)
}

fn parse_aspect_token(word: &str) -> Option<(u32, u32)> {
    let rest = word.strip_prefix("ar-")?;
    let (w, h) = rest.split_once(':')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// Rewrites the workflow template in place: randomizes sampler seeds,
/// overrides latent dimensions when requested, and injects the prompt
/// into the positive text node. Node selection follows the `_meta.title`
/// convention ("positive"/"negative"), falling back to the last text node
/// that is not explicitly negative.
pub fn inject_prompt(
    workflow: &mut Value,
    prompt: &str,
    dimensions: Option<(u32, u32)>,
    seed: i64,
) {
    let Some(nodes) = workflow.as_object_mut() else {
        return;
    };

    let mut positive_node = None;
    let mut negative_node = None;
    let mut last_text_node = None;

    for (node_id, node) in nodes.iter_mut() {
        let Some(class_type) = node.get("class_type").and_then(|v| v.as_str()) else {
            continue;
        };
        let class_type = class_type.to_string();

        if class_type == "KSampler" || class_type == "KSamplerAdvanced" {
            if let Some(inputs) = node.get_mut("inputs").and_then(|v| v.as_object_mut()) {
                if inputs.contains_key("seed") {
                    inputs.insert("seed".to_string(), json!(seed));
                }
            }
        }

        if let Some((width, height)) = dimensions {
            if class_type == "EmptyLatentImage" || class_type == "EmptySD3LatentImage" {
                if let Some(inputs) = node.get_mut("inputs").and_then(|v| v.as_object_mut()) {
                    if inputs.contains_key("width") {
                        inputs.insert("width".to_string(), json!(width));
                    }
                    if inputs.contains_key("height") {
                        inputs.insert("height".to_string(), json!(height));
                    }
                }
            }
        }

        if matches!(
            class_type.as_str(),
            "CLIPTextEncode" | "ShowText" | "PrimitiveString"
        ) {
            let title = node
                .get("_meta")
                .and_then(|m| m.get("title"))
                .and_then(|t| t.as_str())
                .map(str::to_lowercase)
                .unwrap_or_default();
            if title.contains("positive") {
                positive_node = Some(node_id.clone());
            } else if title.contains("negative") {
                negative_node = Some(node_id.clone());
            }
            last_text_node = Some(node_id.clone());
        }
    }

    let target = positive_node.or_else(|| match (&last_text_node, &negative_node) {
        (Some(last), Some(negative)) if last == negative => None,
        (Some(last), _) => Some(last.clone()),
        _ => None,
    });

    if let Some(target) = target {
        if let Some(inputs) = nodes
            .get_mut(&target)
            .and_then(|n| n.get_mut("inputs"))
            .and_then(|v| v.as_object_mut())
        {
            inputs.insert("text".to_string(), json!(prompt));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_override_is_parsed_and_stripped() {
        let (prompt, dims) = strip_aspect_override("a red fox ar-16:9 in snow");
        assert_eq!(prompt, "a red fox in snow");
        assert_eq!(dims, Some((16, 9)));
    }

    #[test]
    fn prompt_without_override_is_untouched() {
        let (prompt, dims) = strip_aspect_override("plain prompt");
        assert_eq!(prompt, "plain prompt");
        assert_eq!(dims, None);

        let (prompt, dims) = strip_aspect_override("bad tag ar-x:y stays");
        assert_eq!(prompt, "bad tag ar-x:y stays");
        assert_eq!(dims, None);
    }

    fn sample_workflow() -> Value {
        json!({
            "3": {
                "class_type": "KSampler",
                "inputs": { "seed": 42, "steps": 20 }
            },
            "5": {
                "class_type": "EmptyLatentImage",
                "inputs": { "width": 512, "height": 512 }
            },
            "6": {
                "class_type": "CLIPTextEncode",
                "_meta": { "title": "Positive Prompt" },
                "inputs": { "text": "" }
            },
            "7": {
                "class_type": "CLIPTextEncode",
                "_meta": { "title": "Negative Prompt" },
                "inputs": { "text": "blurry" }
            }
        })
    }

    #[test]
    fn inject_targets_positive_node_and_randomizes_seed() {
        let mut workflow = sample_workflow();
        inject_prompt(&mut workflow, "a red fox", None, 1234);

        assert_eq!(workflow["6"]["inputs"]["text"], "a red fox");
        assert_eq!(workflow["7"]["inputs"]["text"], "blurry");
        assert_eq!(workflow["3"]["inputs"]["seed"], 1234);
    }

    #[test]
    fn inject_overrides_latent_dimensions() {
        let mut workflow = sample_workflow();
        inject_prompt(&mut workflow, "p", Some((1024, 768)), 1);
        assert_eq!(workflow["5"]["inputs"]["width"], 1024);
        assert_eq!(workflow["5"]["inputs"]["height"], 768);
    }

    #[test]
    fn inject_falls_back_to_last_non_negative_text_node() {
        let mut workflow = json!({
            "1": {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": "" }
            },
            "2": {
                "class_type": "CLIPTextEncode",
                "_meta": { "title": "negative" },
                "inputs": { "text": "nope" }
            }
        });
        inject_prompt(&mut workflow, "fallback", None, 1);
        // Object keys iterate in sorted order, so "2" is the last text
        // node but is explicitly negative; nothing is injected then.
        assert_eq!(workflow["2"]["inputs"]["text"], "nope");
        assert_eq!(workflow["1"]["inputs"]["text"], "");

        let mut workflow = json!({
            "1": {
                "class_type": "CLIPTextEncode",
                "_meta": { "title": "negative" },
                "inputs": { "text": "nope" }
            },
            "2": {
                "class_type": "ShowText",
                "inputs": { "text": "" }
            }
        });
        inject_prompt(&mut workflow, "fallback", None, 1);
        assert_eq!(workflow["2"]["inputs"]["text"], "fallback");
    }

    #[test]
    fn first_output_image_walks_history_outputs() {
        let history = json!({
            "abc123": {
                "outputs": {
                    "9": {
                        "images": [
                            { "filename": "img_00001.png", "subfolder": "", "type": "output" }
                        ]
                    }
                }
            }
        });
        let image = first_output_image(&history, "abc123").unwrap();
        assert_eq!(image.filename, "img_00001.png");
        assert_eq!(image.kind, "output");

        assert!(first_output_image(&history, "missing").is_none());
        assert!(first_output_image(&json!({"abc123": {"outputs": {}}}), "abc123").is_none());
    }
}
