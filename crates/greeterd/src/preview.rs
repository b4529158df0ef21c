//! Frame displays for the recognition loop: an ASCII terminal preview and a
//! headless stand-in.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::{cursor, execute, queue, terminal};
use greeter_core::{FaceMatch, FrameDisplay};
use image::GrayImage;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const ASCII_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];
const DEFAULT_COLS: usize = 80;
const DEFAULT_ROWS: usize = 24;
/// Rows kept free below the picture for the status line.
const STATUS_ROWS: usize = 1;

const ESC_KEY: u32 = 27;
const ENTER_KEY: u32 = 13;

/// Renders frames as ASCII art in the controlling terminal.
///
/// Holds the terminal in raw mode while alive, so Ctrl-C arrives as a key
/// event rather than a signal; it is forwarded to `interrupt`.
pub struct TerminalPreview {
    cols: usize,
    rows: usize,
    interrupt: Arc<AtomicBool>,
}

impl TerminalPreview {
    pub fn new(interrupt: Arc<AtomicBool>) -> io::Result<Self> {
        let (cols, rows) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_COLS, DEFAULT_ROWS));

        terminal::enable_raw_mode()?;
        execute!(
            io::stdout(),
            terminal::EnterAlternateScreen,
            cursor::Hide,
            terminal::Clear(terminal::ClearType::All)
        )?;

        Ok(Self {
            cols: cols.max(1),
            rows: rows.saturating_sub(STATUS_ROWS).max(1),
            interrupt,
        })
    }
}

impl Drop for TerminalPreview {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

impl FrameDisplay for TerminalPreview {
    fn show(&mut self, frame: &GrayImage, faces: &[FaceMatch]) -> io::Result<()> {
        let lines = render(frame, faces, self.cols, self.rows);
        let mut out = io::stdout().lock();
        queue!(out, cursor::MoveTo(0, 0))?;
        for line in &lines {
            write!(out, "{line}\r\n")?;
        }
        write!(out, "faces: {:<3} ESC to quit", faces.len())?;
        out.flush()
    }

    fn wait_key(&mut self, timeout: Duration) -> Option<u32> {
        match event::poll(timeout) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "terminal poll failed");
                return None;
            }
        }
        match event::read() {
            Ok(Event::Key(key)) => {
                if is_interrupt(&key) {
                    self.interrupt.store(true, Ordering::Relaxed);
                    return None;
                }
                key_code(&key)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "terminal read failed");
                None
            }
        }
    }
}

/// Display used when the preview is disabled: nothing is drawn and no key
/// ever arrives, so the loop is paced by the frame interval alone.
#[derive(Debug, Default)]
pub struct Headless;

impl FrameDisplay for Headless {
    fn show(&mut self, _frame: &GrayImage, faces: &[FaceMatch]) -> io::Result<()> {
        if !faces.is_empty() {
            tracing::debug!(faces = faces.len(), "frame annotated");
        }
        Ok(())
    }

    fn wait_key(&mut self, timeout: Duration) -> Option<u32> {
        std::thread::sleep(timeout);
        None
    }
}

fn is_interrupt(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
}

/// Map a key event to the numeric code the loop compares against its exit key.
fn key_code(key: &KeyEvent) -> Option<u32> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Esc => Some(ESC_KEY),
        KeyCode::Enter => Some(ENTER_KEY),
        KeyCode::Char(c) => Some(c as u32),
        _ => None,
    }
}

/// Downsample `frame` into `rows` lines of `cols` characters, with a box and a
/// label drawn for each face.
pub fn render(frame: &GrayImage, faces: &[FaceMatch], cols: usize, rows: usize) -> Vec<String> {
    let (width, height) = frame.dimensions();
    let mut grid = vec![vec![' '; cols]; rows];
    if width == 0 || height == 0 || cols == 0 || rows == 0 {
        return grid.into_iter().map(|row| row.into_iter().collect()).collect();
    }

    for (row, line) in grid.iter_mut().enumerate() {
        let y = (row as u64 * height as u64 / rows as u64) as u32;
        for (col, cell) in line.iter_mut().enumerate() {
            let x = (col as u64 * width as u64 / cols as u64) as u32;
            let level = frame.get_pixel(x, y)[0] as usize;
            *cell = ASCII_RAMP[level * (ASCII_RAMP.len() - 1) / 255];
        }
    }

    let scale_x = |x: u32| (x as u64 * cols as u64 / width as u64) as usize;
    let scale_y = |y: u32| (y as u64 * rows as u64 / height as u64) as usize;

    for face in faces {
        let region = face.region;
        let left = scale_x(region.x).min(cols - 1);
        let top = scale_y(region.y).min(rows - 1);
        let right = scale_x(region.x + region.width).saturating_sub(1).clamp(left, cols - 1);
        let bottom = scale_y(region.y + region.height).saturating_sub(1).clamp(top, rows - 1);

        for line in grid.iter_mut().take(bottom + 1).skip(top) {
            line[left] = '|';
            line[right] = '|';
        }
        for col in left..=right {
            grid[top][col] = '-';
            grid[bottom][col] = '-';
        }

        let label = face.result.name.as_deref().unwrap_or("unknown");
        let label_row = top.saturating_sub(1);
        for (i, ch) in label.chars().enumerate() {
            let col = left + i;
            if col >= cols {
                break;
            }
            grid[label_row][col] = ch;
        }
    }

    grid.into_iter().map(|row| row.into_iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use greeter_core::{CropRegion, FaceBox, RecognitionResult};
    use image::Luma;

    fn face_match(region: CropRegion, name: Option<&str>) -> FaceMatch {
        FaceMatch {
            face: FaceBox {
                x: region.x as f32,
                y: region.y as f32,
                width: region.width as f32,
                height: region.height as f32,
                confidence: 0.9,
            },
            region,
            result: RecognitionResult {
                name: name.map(str::to_string),
                distance: 0.3,
            },
        }
    }

    #[test]
    fn test_render_brightness_ramp() {
        let frame = GrayImage::from_fn(4, 2, |x, _| if x < 2 { Luma([0]) } else { Luma([255]) });
        let lines = render(&frame, &[], 4, 2);
        assert_eq!(lines, vec!["  @@", "  @@"]);
    }

    #[test]
    fn test_render_face_box_and_label() {
        let frame = GrayImage::new(100, 100);
        let region = CropRegion {
            x: 20,
            y: 40,
            width: 60,
            height: 40,
        };
        let lines = render(&frame, &[face_match(region, Some("bob"))], 10, 10);
        assert_eq!(lines.len(), 10);
        assert!(lines.iter().all(|l| l.chars().count() == 10));
        assert_eq!(&lines[3][2..5], "bob");
        assert_eq!(lines[4], "  ------  ");
        assert_eq!(lines[5], "  |    |  ");
        assert_eq!(lines[7], "  ------  ");
    }

    #[test]
    fn test_render_unknown_face_at_top_edge() {
        let frame = GrayImage::new(10, 10);
        let region = CropRegion {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
        };
        let lines = render(&frame, &[face_match(region, None)], 10, 5);
        assert!(lines[0].starts_with("unknown"));
    }

    #[test]
    fn test_render_empty_frame() {
        let lines = render(&GrayImage::new(0, 0), &[], 3, 2);
        assert_eq!(lines, vec!["   ", "   "]);
    }

    #[test]
    fn test_key_codes() {
        let key = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(key_code(&key(KeyCode::Esc)), Some(27));
        assert_eq!(key_code(&key(KeyCode::Char('q'))), Some(113));
        assert_eq!(key_code(&key(KeyCode::Enter)), Some(13));
        assert_eq!(key_code(&key(KeyCode::Up)), None);
        assert!(is_interrupt(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(!is_interrupt(&key(KeyCode::Char('c'))));
    }

    #[test]
    fn test_headless_never_reports_keys() {
        let mut display = Headless;
        assert!(display.show(&GrayImage::new(2, 2), &[]).is_ok());
        assert_eq!(display.wait_key(Duration::from_millis(1)), None);
    }
}
