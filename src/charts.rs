use crate::models::Reading;
use crate::series::SeriesBuffer;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;

pub const GAUGE_MIN: f64 = 0.0;
pub const GAUGE_MAX: f64 = 40.0;
pub const WARNING_FROM: f64 = 23.0;
pub const CRITICAL_FROM: f64 = 30.0;
const MINOR_TICKS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GaugeBand {
    Normal,
    Warning,
    Critical,
}

impl GaugeBand {
    pub fn classify(value: f64) -> Self {
        if value >= CRITICAL_FROM {
            GaugeBand::Critical
        } else if value >= WARNING_FROM {
            GaugeBand::Warning
        } else {
            GaugeBand::Normal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeFrame {
    pub label: &'static str,
    pub value: f64,
    /// One decimal, comma separated, e.g. `21,5`.
    pub display: String,
    pub band: GaugeBand,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    pub min: f64,
    pub max: f64,
    pub warning_from: f64,
    pub critical_from: f64,
    pub minor_ticks: u32,
}

impl GaugeFrame {
    fn new(value: f64, updated_at: Option<OffsetDateTime>) -> Self {
        Self {
            label: "Temp",
            value,
            display: format!("{:.1}", value).replace('.', ","),
            band: GaugeBand::classify(value),
            updated_at,
            min: GAUGE_MIN,
            max: GAUGE_MAX,
            warning_from: WARNING_FROM,
            critical_from: CRITICAL_FROM,
            minor_ticks: MINOR_TICKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineFrame {
    pub x_title: &'static str,
    pub x_format: &'static str,
    pub y_title: &'static str,
    pub points: Vec<Reading>,
}

impl LineFrame {
    fn new(points: Vec<Reading>) -> Self {
        Self {
            x_title: "Time",
            x_format: "HH:mm:ss",
            y_title: "°C",
            points,
        }
    }
}

/// Drawing surface for the two widgets.
pub trait ChartBackend {
    fn draw_gauge(&mut self, frame: &GaugeFrame);
    fn draw_line(&mut self, frame: &LineFrame);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartFrames {
    pub gauge: Option<GaugeFrame>,
    pub line: Option<LineFrame>,
}

/// Publishes every drawn frame to a watch channel for the HTTP view.
pub struct FrameSink {
    frames: watch::Sender<ChartFrames>,
}

impl Default for FrameSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink {
    pub fn new() -> Self {
        let (frames, _) = watch::channel(ChartFrames::default());
        Self { frames }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChartFrames> {
        self.frames.subscribe()
    }
}

impl ChartBackend for FrameSink {
    fn draw_gauge(&mut self, frame: &GaugeFrame) {
        let frame = frame.clone();
        self.frames.send_modify(|frames| frames.gauge = Some(frame));
    }

    fn draw_line(&mut self, frame: &LineFrame) {
        let frame = frame.clone();
        self.frames.send_modify(|frames| frames.line = Some(frame));
    }
}

/// Owns the gauge and line widgets. Until `init` runs, updates and redraws
/// do nothing.
pub struct ChartRenderer<B: ChartBackend> {
    backend: B,
    gauge: Option<GaugeFrame>,
    line: Option<LineFrame>,
}

impl<B: ChartBackend> ChartRenderer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            gauge: None,
            line: None,
        }
    }

    pub fn init(&mut self) {
        self.gauge = Some(GaugeFrame::new(0.0, None));
        self.line = Some(LineFrame::new(Vec::new()));
        self.redraw();
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.gauge.is_some() && self.line.is_some()
    }

    /// Feeds the latest reading to the gauge and the whole buffer to the
    /// line chart, then redraws.
    pub fn update(&mut self, series: &SeriesBuffer) {
        if let (Some(gauge), Some(latest)) = (self.gauge.as_mut(), series.latest()) {
            *gauge = GaugeFrame::new(latest.value, Some(latest.timestamp));
        }
        if let Some(line) = self.line.as_mut() {
            line.points = series.current_points();
        }
        self.redraw();
    }

    pub fn redraw(&mut self) {
        if let Some(gauge) = &self.gauge {
            self.backend.draw_gauge(gauge);
        }
        if let Some(line) = &self.line {
            self.backend.draw_line(line);
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
