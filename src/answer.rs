use std::time::Duration;

use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::{AnswerBackend, AnswerOptions};
use crate::error::{Error, Result};
use crate::store::EncodedImage;

/// 根据问题和检索到的页面图片生成回答
pub trait Answerer {
    /// 图片按相关度从高到低排列
    fn answer(
        &self,
        question: &str,
        images: &[EncodedImage],
    ) -> impl Future<Output = Result<String>> + Send;
}

fn ollama_prompt(question: &str) -> String {
    format!(
        "Please answer the following question using only the information visible in the provided images. Question: {}",
        question
    )
}

fn openai_prompt(question: &str) -> String {
    format!(
        "Please answer the following question based only on the information visible in the provided document images: {}",
        question
    )
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

/// 本地 Ollama 服务，调用 `/api/chat`
#[derive(Debug, Clone)]
pub struct OllamaAnswerer {
    client: Client,
    url: String,
    model: String,
}

impl OllamaAnswerer {
    pub fn new(client: Client, url: &str, model: &str) -> Self {
        Self {
            client,
            url: format!("{}/api/chat", url.trim_end_matches('/')),
            model: model.to_string(),
        }
    }
}

impl Answerer for OllamaAnswerer {
    async fn answer(&self, question: &str, images: &[EncodedImage]) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": ollama_prompt(question),
                "images": images.iter().map(EncodedImage::to_base64).collect::<Vec<_>>(),
            }],
            "stream": false,
        });
        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::RetrievalService(format!("Ollama 返回 {}: {}", status, text)));
        }
        let response: OllamaResponse = response.json().await?;
        Ok(response.message.content)
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

/// OpenAI 兼容接口，调用 `/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiAnswerer {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiAnswerer {
    pub fn new(client: Client, base_url: &str, api_key: &str, model: &str, max_tokens: u32) -> Self {
        Self {
            client,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
        }
    }
}

impl Answerer for OpenAiAnswerer {
    async fn answer(&self, question: &str, images: &[EncodedImage]) -> Result<String> {
        let mut content = vec![json!({ "type": "text", "text": openai_prompt(question) })];
        content.extend(images.iter().map(|img| {
            json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/jpeg;base64,{}", img.to_base64()) },
            })
        }));
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
            "max_tokens": self.max_tokens,
        });
        let response =
            self.client.post(&self.url).bearer_auth(&self.api_key).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::RetrievalService(format!("OpenAI 返回 {}: {}", status, text)));
        }
        let response: OpenAiResponse = response.json().await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::RetrievalService("OpenAI 没有返回回答".to_string()))
    }
}

/// 启动时根据配置选定的回答后端
///
/// 后端是静态选择的，不可用时直接报错，不会回退到另一个后端
#[derive(Debug, Clone)]
pub enum AnswerService {
    Ollama(OllamaAnswerer),
    OpenAi(OpenAiAnswerer),
}

impl AnswerService {
    pub fn new(opts: &AnswerOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| Error::Config(format!("无法创建 HTTP 客户端: {}", e)))?;
        let service = match opts.answer_backend {
            AnswerBackend::Ollama => {
                Self::Ollama(OllamaAnswerer::new(client, &opts.ollama_url, &opts.ollama_model))
            }
            AnswerBackend::Openai => {
                let api_key = opts
                    .openai_api_key
                    .as_deref()
                    .filter(|key| !key.is_empty())
                    .ok_or_else(|| Error::Config("使用 openai 后端时必须设置 OPENAI_API_KEY".to_string()))?;
                Self::OpenAi(OpenAiAnswerer::new(
                    client,
                    &opts.openai_base_url,
                    api_key,
                    &opts.openai_model,
                    opts.max_tokens,
                ))
            }
        };
        debug!("回答后端: {:?}", opts.answer_backend);
        Ok(service)
    }
}

impl Answerer for AnswerService {
    async fn answer(&self, question: &str, images: &[EncodedImage]) -> Result<String> {
        match self {
            Self::Ollama(a) => a.answer(question, images).await,
            Self::OpenAi(a) => a.answer(question, images).await,
        }
    }
}
