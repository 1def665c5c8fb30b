// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理后端
// 负责: 会话构建、执行设备选择、模型元数据读取、前向推理

use anyhow::{Context, Result};
use ndarray::{Array, IxDyn};
use ort::execution_providers::{
    CUDAExecutionProvider, ExecutionProviderDispatch, TensorRTExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use regex::Regex;
use std::time::Instant;
use tracing::{debug, info};

/// 执行设备 (Execution Provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

/// 后端构建参数
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: String,
    pub ep: OrtEP,
    pub trt_fp16: bool,
    pub image_size: (u32, u32), // (height, width)
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    height: u32,
    width: u32,
    names: Option<Vec<String>>,
    author: Option<String>,
    version: Option<String>,
}

impl OrtBackend {
    pub fn build(args: OrtConfig) -> Result<Self> {
        let providers: Vec<ExecutionProviderDispatch> = match args.ep {
            OrtEP::Trt(device_id) => vec![
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .with_fp16(args.trt_fp16)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ],
            OrtEP::CUDA(device_id) => vec![CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()],
            OrtEP::CPU => Vec::new(),
        };

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(providers)?
            .commit_from_file(&args.f)
            .with_context(|| format!("Failed to load ONNX model: {}", args.f))?;

        // 元数据 (ultralytics 导出时写入)
        let (names, author, version) = match session.metadata() {
            Ok(meta) => (
                meta.custom("names").ok().flatten().map(|s| parse_names(&s)),
                meta.custom("author").ok().flatten(),
                meta.custom("version").ok().flatten(),
            ),
            Err(_) => (None, None, None),
        };

        info!(
            "✅ ONNX 模型加载成功: {} | EP: {:?} | 输入 {}x{}",
            args.f, args.ep, args.image_size.1, args.image_size.0
        );

        Ok(Self {
            session,
            ep: args.ep,
            height: args.image_size.0,
            width: args.image_size.1,
            names,
            author,
            version,
        })
    }

    /// 前向推理: NCHW 张量 → 原始输出
    pub fn run(&mut self, xs: Array<f32, IxDyn>, profile: bool) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = Instant::now();
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(&xs)?])
            .context("ONNX inference failed")?;
        let ys = outputs[0].try_extract_array::<f32>()?.into_owned();
        if profile {
            debug!("[ORT H2D + Inference]: {:?}", t.elapsed());
        }
        Ok(vec![ys])
    }

    pub fn ep(&self) -> &OrtEP {
        &self.ep
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }

    pub fn author(&self) -> Option<&String> {
        self.author.as_ref()
    }

    pub fn version(&self) -> Option<&String> {
        self.version.as_ref()
    }
}

/// 解析 ultralytics 元数据中的类别表, 形如 `{0: 'car', 1: 'truck'}`
fn parse_names(raw: &str) -> Vec<String> {
    let re = match Regex::new(r#"(['"])([-()\w '"]+)(['"])"#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    re.captures_iter(raw)
        .map(|caps| caps.extract::<3>().1[1].to_string())
        .collect()
}
