// 该文件是 Saoma （扫码） 项目的一部分。
// tests/decode_roundtrip.rs - 二维码图像解码测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  convert::Infallible,
  sync::{Arc, Mutex},
};

use image::{Rgb, RgbImage, imageops};
use url::Url;

use saoma::{
  decode::{RqrrDecoder, SymbolDecoder},
  frame::{Frame, Tensor},
  input::{CameraAccessError, Facing, FrameSource},
  model::{
    CandidateRow, DetectResult, Model,
    select::{DETECTION_THRESHOLD, select},
  },
  output::{NavigateError, Navigator, StatusHub},
  pipeline::{PassOutcome, Pipeline, PipelineState},
  region::RegionExtractor,
};

/// "https://example.com"，版本 2，纠错等级 M，字节模式
const EXAMPLE_URL: [&str; 25] = [
  "#######....###..#.#######",
  "#.....#...#..####.#.....#",
  "#.###.#.##.#..#...#.###.#",
  "#.###.#.#....###..#.###.#",
  "#.###.#.###..#..#.#.###.#",
  "#.....#.#..#..##..#.....#",
  "#######.#.#.#.#.#.#######",
  "........#.....#.#........",
  "#.#####.....#.....#####..",
  ".#..##..#.##.#...#.#...#.",
  "#####.#.##...####..#.#.##",
  "##.###..#.##.#.##.##....#",
  ".###..#....##.##.##.#.###",
  "#####...#.#.....#..#.#.#.",
  "#.....##..###..#..####.##",
  "#..#...#...#..#######...#",
  "#.#..##.####....#####.#..",
  "........##..#####...##...",
  "#######......##.#.#.#.###",
  "#.....#.##..##..#...##.#.",
  "#.###.#.###.#.#######.#.#",
  "#.###.#.#......#.##.#####",
  "#.###.#.#####..#.....##.#",
  "#.....#....#..#.##.###..#",
  "#######.##.#.....########",
];

/// "hello world"，版本 1，纠错等级 M，字节模式
const HELLO_WORLD: [&str; 21] = [
  "#######.#..##.#######",
  "#.....#..##...#.....#",
  "#.###.#..#..#.#.###.#",
  "#.###.#.##.#..#.###.#",
  "#.###.#.###.#.#.###.#",
  "#.....#.##.#..#.....#",
  "#######.#.#.#.#######",
  "........#..##........",
  "#...#.###..#.#####..#",
  "...###..#..##...####.",
  "..#...##.#.#.##.#..#.",
  "..#.#....##..#.......",
  ".##..##.....#..#...#.",
  "........###.######.#.",
  "#######.#.#.#.#.##.#.",
  "#.....#...####.##..##",
  "#.###.#.##.#.#.....#.",
  "#.###.#.....#...##.##",
  "#.###.#..###...###...",
  "#.....#..#.#.#.......",
  "#######.#..###.##...#",
];

const MODULE: u32 = 8;
const QUIET: u32 = 4;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([20, 20, 20]);

fn render(matrix: &[&str]) -> RgbImage {
  let modules = matrix.len() as u32;
  let side = (modules + 2 * QUIET) * MODULE;
  RgbImage::from_fn(side, side, |x, y| {
    let (mx, my) = (x / MODULE, y / MODULE);
    if mx < QUIET || my < QUIET || mx >= QUIET + modules || my >= QUIET + modules {
      return WHITE;
    }
    let row = matrix[(my - QUIET) as usize].as_bytes();
    if row[(mx - QUIET) as usize] == b'#' {
      INK
    } else {
      WHITE
    }
  })
}

#[test]
fn decodes_rendered_url() {
  let image = render(&EXAMPLE_URL);
  let symbol = RqrrDecoder
    .decode(image.as_raw(), image.width(), image.height())
    .unwrap();
  assert_eq!(symbol.text, "https://example.com");
}

#[test]
fn decodes_rendered_text() {
  let image = render(&HELLO_WORLD);
  let symbol = RqrrDecoder
    .decode(image.as_raw(), image.width(), image.height())
    .unwrap();
  assert_eq!(symbol.text, "hello world");
}

#[test]
fn blank_region_decodes_to_nothing() {
  let image = RgbImage::from_pixel(120, 90, WHITE);
  assert!(
    RqrrDecoder
      .decode(image.as_raw(), image.width(), image.height())
      .is_none()
  );
}

/// 把渲染好的二维码贴到大帧上，返回帧与码区（不含静区）的像素位置
fn scene(matrix: &[&str], at: (u32, u32)) -> (RgbImage, [u32; 4]) {
  let code = render(matrix);
  let mut frame = RgbImage::from_pixel(640, 480, WHITE);
  imageops::replace(&mut frame, &code, at.0 as i64, at.1 as i64);
  let side = matrix.len() as u32 * MODULE;
  let offset = QUIET * MODULE;
  (frame, [at.0 + offset, at.1 + offset, side, side])
}

fn detection_row(frame: &RgbImage, symbol: [u32; 4]) -> CandidateRow {
  let (fw, fh) = (frame.width() as f32, frame.height() as f32);
  let [x, y, w, h] = symbol.map(|v| v as f32);
  CandidateRow::new(
    (x + w / 2.0) / fw,
    (y + h / 2.0) / fh,
    w / fw,
    h / fh,
    0.87,
  )
}

#[test]
fn extracted_region_decodes() {
  let (image, symbol) = scene(&EXAMPLE_URL, (100, 80));
  let row = detection_row(&image, symbol);
  let frame = Frame::from(image);
  let detection = select(&[row], DETECTION_THRESHOLD).unwrap();

  let extractor = RegionExtractor::default();
  let region = extractor.extract(&frame, &detection).unwrap();
  let cropped = extractor.crop(&frame, &region).unwrap();
  let text = RqrrDecoder
    .decode(cropped.as_raw(), cropped.width(), cropped.height())
    .map(|s| s.text);
  assert_eq!(text.as_deref(), Some("https://example.com"));
}

struct PhotoCamera {
  image: RgbImage,
  running: bool,
}

impl FrameSource for PhotoCamera {
  fn start(&mut self, _: Facing) -> Result<(), CameraAccessError> {
    self.running = true;
    Ok(())
  }

  fn current_frame(&mut self) -> Option<Frame> {
    self.running.then(|| Frame::from(&self.image))
  }

  fn stop(&mut self) {
    self.running = false;
  }
}

/// 直接给出码的位置，代替真实检测模型
struct KnownLocation(CandidateRow);

impl Model for KnownLocation {
  type Input = Tensor;
  type Output = DetectResult;
  type Error = Infallible;

  fn infer(&self, _: &Tensor) -> Result<DetectResult, Infallible> {
    Ok(DetectResult {
      rows: vec![CandidateRow::new(0.1, 0.1, 0.05, 0.05, 0.3), self.0].into_boxed_slice(),
    })
  }
}

#[derive(Default)]
struct RecordingNavigator {
  urls: Mutex<Vec<Url>>,
}

impl Navigator for RecordingNavigator {
  fn navigate(&self, url: &Url) -> Result<(), NavigateError> {
    self.urls.lock().unwrap().push(url.clone());
    Ok(())
  }
}

#[test]
fn pipeline_decodes_url_from_camera_frame() {
  let (image, symbol) = scene(&EXAMPLE_URL, (300, 150));
  let row = detection_row(&image, symbol);
  let navigator = Arc::new(RecordingNavigator::default());
  let pipeline = Pipeline::new(
    PhotoCamera {
      image,
      running: false,
    },
    KnownLocation(row),
    RqrrDecoder,
    Arc::new(StatusHub::new()),
    navigator.clone(),
  );

  pipeline.start().unwrap();
  let outcome = pipeline.run_pass();

  let expected = Url::parse("https://example.com").unwrap();
  assert_eq!(outcome, PassOutcome::Url(expected.clone()));
  assert_eq!(pipeline.state(), PipelineState::Idle);
  assert_eq!(*navigator.urls.lock().unwrap(), vec![expected]);
}

#[test]
fn pipeline_keeps_scanning_after_text() {
  let (image, symbol) = scene(&HELLO_WORLD, (40, 200));
  let row = detection_row(&image, symbol);
  let navigator = Arc::new(RecordingNavigator::default());
  let pipeline = Pipeline::new(
    PhotoCamera {
      image,
      running: false,
    },
    KnownLocation(row),
    RqrrDecoder,
    Arc::new(StatusHub::new()),
    navigator.clone(),
  );

  pipeline.start().unwrap();
  assert_eq!(
    pipeline.run_pass(),
    PassOutcome::Text("hello world".to_string())
  );
  assert!(pipeline.is_scanning());
  assert!(navigator.urls.lock().unwrap().is_empty());
}
