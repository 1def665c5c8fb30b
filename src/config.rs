// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 服务启动参数 (命令行 / 环境变量)

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::models::YOLOv8Config;
use crate::OrtEP;

/// 车道车流统计 Web 服务
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "YOLOv8 车道车流统计服务", long_about = None)]
pub struct Args {
    /// 监听地址
    #[arg(long, env = "TC_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// 监听端口
    #[arg(long, env = "TC_PORT", default_value_t = 8000)]
    pub port: u16,

    /// ONNX 模型路径
    #[arg(long, env = "TC_MODEL", default_value = "runs/detect/train/weights/best.onnx")]
    pub model: String,

    /// 上传目录
    #[arg(long, env = "TC_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// 输出目录
    #[arg(long, env = "TC_OUTPUT_DIR", default_value = "outputs")]
    pub output_dir: PathBuf,

    /// 静态页面目录
    #[arg(long, env = "TC_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// 叠加层字体 (TTF/OTF), 缺省使用内置 DejaVu Sans
    #[arg(long, env = "TC_FONT")]
    pub font: Option<PathBuf>,

    /// 输出视频编码器
    #[arg(long, env = "TC_VIDEO_CODEC", default_value = "mpeg4")]
    pub video_codec: String,

    /// 车道几何配置 (JSON, 可选)
    #[arg(long, env = "TC_LANE_CONFIG")]
    pub lane_config: Option<PathBuf>,

    /// 置信度阈值
    #[arg(long, env = "TC_CONF", default_value_t = 0.4)]
    pub conf: f32,

    /// NMS IoU 阈值
    #[arg(long, env = "TC_IOU", default_value_t = 0.7)]
    pub iou: f32,

    /// 推理输入尺寸
    #[arg(long, env = "TC_IMGSZ", default_value_t = 640)]
    pub imgsz: u32,

    /// 使用 CUDA
    #[arg(long, env = "TC_CUDA")]
    pub cuda: bool,

    /// 使用 TensorRT
    #[arg(long, env = "TC_TRT")]
    pub trt: bool,

    /// TensorRT FP16
    #[arg(long)]
    pub fp16: bool,

    /// GPU 设备号
    #[arg(long, env = "TC_DEVICE_ID", default_value_t = 0)]
    pub device_id: i32,

    /// 打印推理耗时
    #[arg(long)]
    pub profile: bool,
}

impl Args {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn ep(&self) -> OrtEP {
        if self.trt {
            OrtEP::Trt(self.device_id)
        } else if self.cuda {
            OrtEP::CUDA(self.device_id)
        } else {
            OrtEP::CPU
        }
    }

    pub fn model_config(&self) -> YOLOv8Config {
        YOLOv8Config {
            model: self.model.clone(),
            imgsz: self.imgsz,
            conf: self.conf,
            iou: self.iou,
            ep: self.ep(),
            fp16: self.fp16,
            profile: self.profile,
        }
    }
}
