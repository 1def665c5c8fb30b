// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
// 构建脚本: 静态链接 FFmpeg 时补充系统库 (转码器依赖)
fn main() {
    // vcpkg 静态 FFmpeg 在 Windows MSVC 下缺少的依赖
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // 输出编码器
        println!("cargo:rustc-link-lib=dylib=libx264");

        // avformat 依赖的系统库
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
