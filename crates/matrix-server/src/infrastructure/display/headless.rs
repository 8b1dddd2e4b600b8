//! In-memory panel backend.
//!
//! Behaves like a real double-buffered panel: writes go to an off-screen
//! canvas, and `swap_on_vsync` exchanges it with the visible one.  The visible
//! canvas is published to state shared with every clone of the backend, so a
//! test (or a status endpoint) can see exactly what the "panel" is showing.
//!
//! With a refresh rate configured, swaps are paced to at most one per refresh
//! period, imitating the blocking vsync wait of real hardware.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use matrix_core::{Framebuffer, Rgba, Size};
use tracing::{debug, trace};

use super::driver::{DriverError, MatrixBackend, MatrixDriver, MatrixOptions};

#[derive(Debug, Default)]
struct PanelState {
    /// Canvas currently visible; `None` until the first swap.
    front: Option<Framebuffer>,
    swaps: u64,
    opened: u64,
    closed: u64,
    last_options: Option<MatrixOptions>,
}

/// Backend that renders into memory instead of onto an LED panel.
///
/// Cloning shares the observed panel state.
#[derive(Debug, Clone, Default)]
pub struct HeadlessBackend {
    state: Arc<Mutex<PanelState>>,
    refresh_period: Option<Duration>,
    /// Overrides the size the driver reports (simulates wiring mistakes).
    reported_size: Option<Size>,
    /// When set, `create` fails with this reason.
    init_failure: Option<String>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paces swaps to `hz` per second.  `0` disables pacing.
    pub fn with_refresh_rate(mut self, hz: u32) -> Self {
        self.refresh_period = (hz > 0).then(|| Duration::from_secs(1) / hz);
        self
    }

    /// Makes every driver report `size` regardless of the requested geometry.
    pub fn with_reported_size(mut self, size: Size) -> Self {
        self.reported_size = Some(size);
        self
    }

    /// Makes every `create` call fail.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            init_failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Snapshot of the visible canvas, or `None` before the first swap.
    pub fn presented(&self) -> Option<Framebuffer> {
        self.lock().front.clone()
    }

    /// Number of completed swaps across every driver this backend opened.
    pub fn swap_count(&self) -> u64 {
        self.lock().swaps
    }

    /// `true` while a driver is open and not yet closed.
    pub fn is_open(&self) -> bool {
        let state = self.lock();
        state.opened > state.closed
    }

    pub fn close_count(&self) -> u64 {
        self.lock().closed
    }

    /// Options passed to the most recent `create` call.
    pub fn last_options(&self) -> Option<MatrixOptions> {
        self.lock().last_options
    }

    fn lock(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MatrixBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create(&self, options: &MatrixOptions) -> Result<Box<dyn MatrixDriver>, DriverError> {
        if let Some(reason) = &self.init_failure {
            return Err(DriverError::Init(reason.clone()));
        }
        let geometry_size = options
            .geometry
            .size()
            .map_err(|e| DriverError::Init(e.to_string()))?;
        let size = self.reported_size.unwrap_or(geometry_size);
        let canvas = || Framebuffer::with_size(size).map_err(|e| DriverError::Init(e.to_string()));

        {
            let mut state = self.lock();
            state.opened += 1;
            state.last_options = Some(*options);
        }
        debug!("headless panel created ({size})");

        Ok(Box::new(HeadlessDriver {
            size,
            back: canvas()?,
            front: canvas()?,
            shared: Arc::clone(&self.state),
            refresh_period: self.refresh_period,
            last_swap: None,
            closed: false,
        }))
    }
}

struct HeadlessDriver {
    size: Size,
    back: Framebuffer,
    front: Framebuffer,
    shared: Arc<Mutex<PanelState>>,
    refresh_period: Option<Duration>,
    last_swap: Option<Instant>,
    closed: bool,
}

impl HeadlessDriver {
    fn wait_for_vsync(&mut self) {
        if let (Some(period), Some(last)) = (self.refresh_period, self.last_swap) {
            let elapsed = last.elapsed();
            if elapsed < period {
                thread::sleep(period - elapsed);
            }
        }
        self.last_swap = Some(Instant::now());
    }
}

impl MatrixDriver for HeadlessDriver {
    fn size(&self) -> Size {
        self.size
    }

    fn set_pixel(&mut self, x: u32, y: u32, r: u8, g: u8, b: u8) {
        // Alpha is not a hardware concept; the visible canvas is always opaque.
        self.back.set(x as i32, y as i32, Rgba::rgb(r, g, b));
    }

    fn swap_on_vsync(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        self.wait_for_vsync();
        std::mem::swap(&mut self.back, &mut self.front);

        let mut state = self.shared.lock().unwrap_or_else(|p| p.into_inner());
        state.front = Some(self.front.clone());
        state.swaps += 1;
        trace!("headless swap #{}", state.swaps);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        self.closed = true;
        let mut state = self.shared.lock().unwrap_or_else(|p| p.into_inner());
        state.closed += 1;
        // A closed panel is dark.
        if let Some(front) = state.front.as_mut() {
            front.clear();
        }
        debug!("headless panel closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_core::Geometry;

    fn open_driver(backend: &HeadlessBackend) -> Box<dyn MatrixDriver> {
        backend
            .create(&MatrixOptions::with_geometry(Geometry::new(2, 2, 2, 1)))
            .expect("create")
    }

    #[test]
    fn test_driver_reports_geometry_size() {
        let backend = HeadlessBackend::new();
        let driver = open_driver(&backend);
        assert_eq!(driver.size(), Size::new(4, 2));
        assert!(backend.is_open());
    }

    #[test]
    fn test_nothing_is_presented_before_first_swap() {
        let backend = HeadlessBackend::new();
        let mut driver = open_driver(&backend);
        driver.set_pixel(0, 0, 0xFF, 0, 0);
        assert_eq!(backend.presented(), None);
        assert_eq!(backend.swap_count(), 0);
    }

    #[test]
    fn test_swap_publishes_back_canvas_as_opaque() {
        // Arrange
        let backend = HeadlessBackend::new();
        let mut driver = open_driver(&backend);

        // Act
        driver.set_pixel(3, 1, 0x40, 0, 0);
        driver.swap_on_vsync().unwrap();

        // Assert
        let front = backend.presented().expect("presented");
        assert_eq!(front.get(3, 1), Some(Rgba::rgb(0x40, 0, 0)));
        assert_eq!(front.get(0, 0), Some(Rgba::BLACK));
        assert_eq!(backend.swap_count(), 1);
    }

    #[test]
    fn test_swap_exchanges_canvases() {
        let backend = HeadlessBackend::new();
        let mut driver = open_driver(&backend);
        driver.set_pixel(0, 0, 1, 2, 3);
        driver.swap_on_vsync().unwrap();

        // Second swap without writes shows the previous (blank) back canvas.
        driver.swap_on_vsync().unwrap();

        assert_eq!(backend.presented().unwrap().get(0, 0), Some(Rgba::BLACK));
    }

    #[test]
    fn test_refresh_rate_paces_swaps() {
        let backend = HeadlessBackend::new().with_refresh_rate(50); // 20 ms
        let mut driver = open_driver(&backend);

        let start = Instant::now();
        for _ in 0..3 {
            driver.swap_on_vsync().unwrap();
        }

        // First swap is immediate; the next two wait a period each.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_close_twice_is_rejected_and_counted_once() {
        let backend = HeadlessBackend::new();
        let mut driver = open_driver(&backend);

        assert_eq!(driver.close(), Ok(()));
        assert_eq!(driver.close(), Err(DriverError::Closed));
        assert_eq!(backend.close_count(), 1);
        assert!(!backend.is_open());
        assert_eq!(driver.swap_on_vsync(), Err(DriverError::Closed));
    }

    #[test]
    fn test_failing_backend_reports_init_error() {
        let backend = HeadlessBackend::failing("no GPIO access");
        let result = backend.create(&MatrixOptions::DEFAULT);
        assert!(matches!(result, Err(DriverError::Init(reason)) if reason == "no GPIO access"));
    }
}
