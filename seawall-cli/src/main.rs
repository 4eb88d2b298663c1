use anyhow::{Context, Result};
use clap::Parser;
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use tracing::{error, info, warn};

use seawall::parser::{read_assets, read_elevation};
use seawall::{write_segment_layer, GeoJsonWriter, Pipeline, PipelineConfig, PlanarEngine};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 入力標高ラスタ（.asc、gdal 機能有効時は GeoTIFF なども可）
    #[arg(value_name = "DEM")]
    dem: PathBuf,

    /// 資産の GeoJSON（Point または Polygon）
    #[arg(short, long, value_name = "FILE")]
    assets: PathBuf,

    /// 出力する区画レイヤー（.geojson、gdal 機能有効時は .gpkg / .shp も可）
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// 潮位の標高
    #[arg(long, default_value_t = 4.0)]
    tide: f64,

    /// 高潮の標高
    #[arg(long, default_value_t = 15.0)]
    surge: f64,

    /// 資産価値の属性名
    #[arg(long, default_value = "value")]
    value_field: String,

    /// 資産IDの属性名
    #[arg(long, default_value = "id")]
    id_field: String,

    /// 途中経過を書き出すディレクトリ
    #[arg(short, long, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// 並列処理スレッド数（デフォルト: CPUコア数）
    #[arg(short, long)]
    threads: Option<usize>,

    /// 候補点抽出の乱数シード
    #[arg(long)]
    seed: Option<u64>,

    /// 候補点の最小間隔
    #[arg(long)]
    spacing: Option<f64>,

    /// 曲線ごとの候補点数
    #[arg(long)]
    sample_count: Option<usize>,

    /// 平滑化の半径（セル数）
    #[arg(long)]
    smoothing_radius: Option<usize>,

    /// 等高線抽出で残す最小領域（セル数）
    #[arg(long)]
    min_region_cells: Option<usize>,

    /// 等高線抽出で残す最小線長
    #[arg(long)]
    min_line_length: Option<f64>,

    /// 出力の座標系（OGR 出力時のみ）
    #[arg(long)]
    epsg: Option<u32>,
}

impl Args {
    /// 引数で既定値を上書き
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new();
        if let Some(seed) = self.seed {
            config.sampling.seed = seed;
        }
        if let Some(spacing) = self.spacing {
            config.sampling.spacing = spacing;
        }
        if let Some(count) = self.sample_count {
            config.sampling.target_count = count;
            config.sampling.max_attempts = config.sampling.max_attempts.max(count * 20);
        }
        if let Some(radius) = self.smoothing_radius {
            config.contour.smoothing_radius = radius;
        }
        if let Some(cells) = self.min_region_cells {
            config.contour.min_region_cells = cells;
        }
        if let Some(length) = self.min_line_length {
            config.contour.min_line_length = length;
        }
        config
    }
}

fn main() -> Result<()> {
    // ログの初期化
    tracing_subscriber::fmt::init();

    // CLI引数の解析
    let args = Args::parse();

    // 処理開始時間を記録
    let start_time = std::time::Instant::now();

    // スレッドプールの設定
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    if args.tide >= args.surge {
        error!(
            "Tide elevation {} must be below surge elevation {}",
            args.tide, args.surge
        );
        anyhow::bail!("--tide must be less than --surge");
    }

    // 入力の読み込み
    let field = read_elevation(&args.dem)
        .with_context(|| format!("Failed to read elevation {:?}", args.dem))?;
    let assets = read_assets(&args.assets, &args.value_field, &args.id_field)
        .with_context(|| format!("Failed to read assets {:?}", args.assets))?;

    // 区画化と被害額の集計
    let engine = PlanarEngine::new();
    let pipeline = Pipeline::new(&engine, args.pipeline_config());
    let layer = pipeline
        .run(&field, &assets, args.tide, args.surge)
        .context("Segmentation failed")?;

    if !layer.warnings.is_empty() {
        warn!("Finished with {} warnings", layer.warnings.len());
    }

    // 出力
    write_segment_layer(&layer.segments, &args.output, args.epsg)?;
    info!("Written segments: {:?}", args.output);

    if let Some(workspace) = &args.workspace {
        GeoJsonWriter::new().write_intermediates(&layer.intermediates, workspace)?;
        info!("Written intermediates: {:?}", workspace);
    }

    // 処理時間を表示
    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    Ok(())
}
