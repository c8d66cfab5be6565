//! 贝塞尔曲线插值

/// 贝塞尔曲线（关键帧插值，控制点归一化到 0..1）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BezierCurve {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BezierCurve {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 线性插值
    pub fn linear() -> Self {
        Self::new(0.25, 0.25, 0.75, 0.75)
    }

    /// 从 0..127 的控制点创建
    pub fn from_control_points(data: [u8; 4]) -> Self {
        Self {
            x1: data[0] as f32 / 127.0,
            y1: data[1] as f32 / 127.0,
            x2: data[2] as f32 / 127.0,
            y2: data[3] as f32 / 127.0,
        }
    }

    /// 两个控制点都在对角线上时曲线退化为直线
    pub fn is_linear(&self) -> bool {
        self.x1 == self.y1 && self.x2 == self.y2
    }

    /// 对插值系数做缓动；线性曲线直接返回
    pub fn ease(&self, t: f32) -> f32 {
        if self.is_linear() {
            t
        } else {
            self.evaluate(t)
        }
    }

    /// 评估贝塞尔曲线
    pub fn evaluate(&self, t: f32) -> f32 {
        if t <= 0.0 {
            return 0.0;
        }
        if t >= 1.0 {
            return 1.0;
        }

        // 牛顿法求解 x(s) = t
        let mut s = t;
        for _ in 0..15 {
            let x = self.bezier_x(s);
            let dx = self.bezier_dx(s);

            if dx.abs() < 1e-6 {
                break;
            }

            let new_s = (s - (x - t) / dx).clamp(0.0, 1.0);
            if (new_s - s).abs() < 1e-6 {
                s = new_s;
                break;
            }
            s = new_s;
        }

        self.bezier_y(s)
    }

    fn bezier_x(&self, s: f32) -> f32 {
        let t = 1.0 - s;
        3.0 * t * t * s * self.x1 + 3.0 * t * s * s * self.x2 + s * s * s
    }

    fn bezier_y(&self, s: f32) -> f32 {
        let t = 1.0 - s;
        3.0 * t * t * s * self.y1 + 3.0 * t * s * s * self.y2 + s * s * s
    }

    fn bezier_dx(&self, s: f32) -> f32 {
        let t = 1.0 - s;
        3.0 * t * t * self.x1 + 6.0 * t * s * (self.x2 - self.x1) + 3.0 * s * s * (1.0 - self.x2)
    }
}

impl Default for BezierCurve {
    fn default() -> Self {
        Self::linear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_curve_is_identity() {
        let curve = BezierCurve::linear();
        assert!(curve.is_linear());
        for t in [0.0, 0.1, 0.5, 0.9, 1.0] {
            assert!((curve.ease(t) - t).abs() < 1e-6);
        }
    }

    #[test]
    fn test_ease_in_out_is_symmetric() {
        let curve = BezierCurve::from_control_points([63, 0, 64, 127]);
        assert!(!curve.is_linear());
        let a = curve.evaluate(0.25);
        let b = curve.evaluate(0.75);
        assert!(a < 0.25);
        assert!(b > 0.75);
        assert!((curve.evaluate(0.5) - 0.5).abs() < 0.01);
    }
}
