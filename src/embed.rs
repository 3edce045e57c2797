use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::RgbImage;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmbedOptions;
use crate::error::{Error, Result};
use crate::pooling::MultiVectorEmbedding;
use crate::raster::encode_png;

/// 将图片或文本转换为多向量嵌入
///
/// 实例在进程启动时创建一次，之后只读共享
pub trait Embedder {
    /// 每张图片返回一个多向量嵌入，顺序与输入一致
    fn embed_images(
        &self,
        images: &[RgbImage],
    ) -> impl Future<Output = Result<Vec<MultiVectorEmbedding>>> + Send;

    /// 为查询文本生成多向量嵌入
    fn embed_query(&self, query: &str) -> impl Future<Output = Result<MultiVectorEmbedding>> + Send;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    queries: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<MultiVectorEmbedding>,
}

/// 通过 HTTP 调用 ColPali 风格的嵌入服务
///
/// 请求 `POST {url}/embed`，图片以 base64 PNG 发送，
/// 返回 `{"embeddings": [[[f32]]]}`，每个输入对应一组 token 向量
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: Client,
    url: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(opts: &EmbedOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(opts.embed_timeout))
            .build()
            .map_err(|e| Error::Config(format!("无法创建 HTTP 客户端: {}", e)))?;
        Ok(Self {
            client,
            url: format!("{}/embed", opts.embed_url.trim_end_matches('/')),
            model: opts.embed_model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, body: &EmbedRequest<'_>, expected: usize) -> Result<Vec<MultiVectorEmbedding>> {
        let response = self.client.post(&self.url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::RetrievalService(format!("嵌入服务返回 {}: {}", status, text)));
        }
        let response: EmbedResponse = response.json().await?;
        if response.embeddings.len() != expected {
            return Err(Error::InvalidEmbedding(format!(
                "请求了 {} 个嵌入，嵌入服务返回了 {} 个",
                expected,
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }
}

impl Embedder for HttpEmbedder {
    async fn embed_images(&self, images: &[RgbImage]) -> Result<Vec<MultiVectorEmbedding>> {
        let images = images
            .iter()
            .map(|img| encode_png(img).map(|png| STANDARD.encode(png)))
            .collect::<Result<Vec<_>>>()?;
        let n = images.len();
        debug!("请求 {} 张图片的嵌入", n);
        let body = EmbedRequest { model: &self.model, images, queries: vec![] };
        self.request(&body, n).await
    }

    async fn embed_query(&self, query: &str) -> Result<MultiVectorEmbedding> {
        let body = EmbedRequest { model: &self.model, images: vec![], queries: vec![query] };
        let mut embeddings = self.request(&body, 1).await?;
        Ok(embeddings.remove(0))
    }
}
