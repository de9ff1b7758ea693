use inkroom_shared::{Point, Surface};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

/// `Surface` backed by the page's 2D canvas context.
pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
}

impl CanvasSurface {
    pub fn new(canvas: HtmlCanvasElement, ctx: CanvasRenderingContext2d) -> Self {
        Self { canvas, ctx }
    }
}

impl Surface for CanvasSurface {
    fn clear(&mut self, background: &str) {
        let width = self.canvas.width() as f64;
        let height = self.canvas.height() as f64;
        let _ = self.ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        self.ctx.clear_rect(0.0, 0.0, width, height);
        self.ctx.set_fill_style_str(background);
        self.ctx.fill_rect(0.0, 0.0, width, height);
    }

    fn save(&mut self) {
        self.ctx.save();
    }

    fn restore(&mut self) {
        self.ctx.restore();
    }

    fn set_transform(&mut self, scale: f64, offset_x: f64, offset_y: f64) {
        let _ = self
            .ctx
            .set_transform(scale, 0.0, 0.0, scale, offset_x, offset_y);
    }

    fn set_ink(&mut self, color: &str, line_width: f64) {
        self.ctx.set_stroke_style_str(color);
        self.ctx.set_fill_style_str(color);
        self.ctx.set_line_width(line_width);
        self.ctx.set_line_cap("round");
        self.ctx.set_line_join("round");
    }

    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.ctx.stroke_rect(x, y, width, height);
    }

    fn stroke_polyline(&mut self, points: &[Point]) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        self.ctx.begin_path();
        self.ctx.move_to(first.x, first.y);
        for point in rest {
            self.ctx.line_to(point.x, point.y);
        }
        self.ctx.stroke();
    }

    fn stroke_arc(&mut self, center: Point, radius: f64, start: f64, end: f64) {
        self.ctx.begin_path();
        let _ = self.ctx.arc(center.x, center.y, radius, start, end);
        self.ctx.stroke();
    }

    fn fill_text(&mut self, text: &str, at: Point, font: &str) {
        self.ctx.set_font(font);
        let _ = self.ctx.fill_text(text, at.x, at.y);
    }
}
