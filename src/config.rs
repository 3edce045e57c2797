use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs =
        ProjectDirs::from("", "pagesearch", "pagesearch").expect("failed to get project dir");
    ConfDir { path: proj_dirs.data_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap()
}

/// PDF 光栅化参数
#[derive(Parser, Debug, Clone)]
pub struct RasterOptions {
    /// 渲染分辨率，PDF 标准为 72 DPI
    #[arg(long, value_name = "DPI", default_value_t = 300, value_parser = clap::value_parser!(u32).range(36..=1200))]
    pub dpi: u32,
}

/// 嵌入服务参数
#[derive(Parser, Debug, Clone)]
pub struct EmbedOptions {
    /// 嵌入服务地址
    #[arg(long, env = "EMBED_URL", value_name = "URL", default_value = "http://127.0.0.1:8001")]
    pub embed_url: String,
    /// 嵌入模型名称
    #[arg(long, env = "EMBED_MODEL", value_name = "MODEL", default_value = "vidore/colqwen2-v1.0")]
    pub embed_model: String,
    /// 嵌入请求超时时间，单位为秒
    #[arg(long, value_name = "SECONDS", default_value_t = 300)]
    pub embed_timeout: u64,
}

/// 回答服务参数
#[derive(Parser, Debug, Clone)]
pub struct AnswerOptions {
    /// 回答生成后端，启动时静态选择，不会自动回退
    #[arg(long, env = "ANSWER_BACKEND", value_enum, default_value_t = AnswerBackend::Ollama)]
    pub answer_backend: AnswerBackend,
    /// Ollama 服务地址
    #[arg(long, env = "OLLAMA_URL", value_name = "URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,
    /// Ollama 视觉模型
    #[arg(long, env = "OLLAMA_MODEL", value_name = "MODEL", default_value = "llama3.2-vision")]
    pub ollama_model: String,
    /// OpenAI API 密钥，使用 openai 后端时必填
    #[arg(long, env = "OPENAI_API_KEY", value_name = "KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
    /// OpenAI 兼容接口地址
    #[arg(long, env = "OPENAI_BASE_URL", value_name = "URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,
    /// OpenAI 视觉模型
    #[arg(long, env = "OPENAI_MODEL", value_name = "MODEL", default_value = "gpt-4o")]
    pub openai_model: String,
    /// 生成回答的最大 token 数
    #[arg(long, value_name = "N", default_value_t = 1000)]
    pub max_tokens: u32,
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 检索的相关页面数量
    #[arg(short, value_name = "K", default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=crate::MAX_TOP_K as i64))]
    pub k: u32,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "pagesearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 数据目录，保存文档数据库
    #[arg(short, long, env = "PAGESEARCH_DIR", default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 创建集合，已存在时什么也不做
    Create(CreateCommand),
    /// 列出所有集合
    List(ListCommand),
    /// 将 PDF 文档逐页添加到集合
    Add(AddCommand),
    /// 在集合中搜索与问题最相关的页面
    Search(SearchCommand),
    /// 检索相关页面并生成回答
    Ask(AskCommand),
    /// 启动 HTTP 服务
    Server(ServerCommand),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerBackend {
    /// 本地 Ollama 服务
    Ollama,
    /// OpenAI 兼容接口
    Openai,
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("pagesearch.db")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

impl From<&Path> for ConfDir {
    fn from(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }
}
