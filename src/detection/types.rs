// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测数据结构定义
/// Data structures for vehicle detection
use serde::Serialize;

/// 检测框 (xmin, ymin, width, height) + 类别 + 置信度
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Bbox {
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    id: usize,
    confidence: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32, id: usize, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            id,
            confidence,
        }
    }

    /// 由两个角点 (x1, y1, x2, y2) 构造
    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32, id: usize, confidence: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1, id, confidence)
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn intersection_area(&self, another: &Bbox) -> f32 {
        let l = self.xmin.max(another.xmin);
        let r = self.xmax().min(another.xmax());
        let t = self.ymin.max(another.ymin);
        let b = self.ymax().min(another.ymax());
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &Bbox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Bbox) -> f32 {
        let union = self.union(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }
}

/// 单帧检测结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionResult {
    pub bboxes: Vec<Bbox>,
}

impl DetectionResult {
    pub fn new(bboxes: Vec<Bbox>) -> Self {
        Self { bboxes }
    }

    pub fn bboxes(&self) -> &[Bbox] {
        &self.bboxes
    }

    pub fn into_bboxes(self) -> Vec<Bbox> {
        self.bboxes
    }
}

/// 非极大值抑制 (按置信度降序, 与已保留的同类框 IoU 超阈值者丢弃)
///
/// 按类别分别抑制, 不同类别的重叠框都会保留。
pub fn non_max_suppression(xs: &mut Vec<Bbox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence().total_cmp(&b1.confidence()));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].id() == xs[index].id() && xs[prev_index].iou(&xs[index]) > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xyxy_accessors() {
        let b = Bbox::from_xyxy(10.0, 20.0, 50.0, 80.0, 2, 0.9);
        assert_eq!(b.xmin(), 10.0);
        assert_eq!(b.ymin(), 20.0);
        assert_eq!(b.xmax(), 50.0);
        assert_eq!(b.ymax(), 80.0);
        assert_eq!(b.area(), 40.0 * 60.0);
    }

    #[test]
    fn test_iou_disjoint_and_identical() {
        let a = Bbox::from_xyxy(0.0, 0.0, 10.0, 10.0, 0, 0.9);
        let b = Bbox::from_xyxy(20.0, 20.0, 30.0, 30.0, 0, 0.9);
        assert_eq!(a.iou(&b), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_highest_confidence() {
        let mut xs = vec![
            Bbox::from_xyxy(0.0, 0.0, 10.0, 10.0, 0, 0.5),
            Bbox::from_xyxy(1.0, 1.0, 11.0, 11.0, 0, 0.9),
            Bbox::from_xyxy(100.0, 100.0, 110.0, 110.0, 0, 0.6),
        ];
        non_max_suppression(&mut xs, 0.5);
        assert_eq!(xs.len(), 2);
        assert_eq!(xs[0].confidence(), 0.9);
        assert_eq!(xs[1].confidence(), 0.6);
    }

    #[test]
    fn test_nms_is_per_class() {
        let mut xs = vec![
            Bbox::from_xyxy(100.0, 400.0, 200.0, 480.0, 0, 0.9),
            Bbox::from_xyxy(102.0, 402.0, 202.0, 482.0, 1, 0.8),
            Bbox::from_xyxy(101.0, 401.0, 201.0, 481.0, 0, 0.7),
        ];
        non_max_suppression(&mut xs, 0.7);
        assert_eq!(xs.len(), 2);
        assert_eq!((xs[0].id(), xs[0].confidence()), (0, 0.9));
        assert_eq!((xs[1].id(), xs[1].confidence()), (1, 0.8));
    }
}
