use std::{
    fs::File,
    io::{self, BufWriter, Stdout, Write},
    path::Path,
};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, SetTitle},
    tty::IsTty,
};

use crate::{
    error::{Error, Result},
    proc::{Grid, Rect},
};

/// Receives every generation the driver produces, starting with 0.
pub trait GenerationSink {
    fn emit(&mut self, generation: u64, grid: &Grid) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct Marks {
    pub alive: u8,
    pub dead: u8,
}

/// `'1'` matches the input format, so any block can be read back.
pub const FILE_MARKS: Marks = Marks { alive: b'1', dead: b'.' };
pub const CONSOLE_MARKS: Marks = Marks { alive: b'O', dead: b'.' };

fn write_block<W: Write>(out: &mut W, generation: u64, grid: &Grid, marks: Marks) -> io::Result<()> {
    writeln!(out, "Generation {generation}:")?;
    let mut line = Vec::with_capacity(grid.size().cols() + 1);
    for row in grid.rows() {
        line.clear();
        line.extend(row.iter().map(|c| if c.is_alive() { marks.alive } else { marks.dead }));
        line.push(b'\n');
        out.write_all(&line)?;
    }
    writeln!(out)
}

/// Output file writer: a label line, the rows, a blank line.
pub struct TextWriter<W: Write> {
    out: W,
}

impl TextWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(TextWriter::new(BufWriter::new(file)))
    }
}

impl<W: Write> TextWriter<W> {
    #[inline]
    pub fn new(out: W) -> Self {
        TextWriter { out }
    }

    #[inline]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> GenerationSink for TextWriter<W> {
    fn emit(&mut self, generation: u64, grid: &Grid) -> Result<()> {
        write_block(&mut self.out, generation, grid, FILE_MARKS)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum ConsoleMode {
    #[default]
    Plain,
    /// Redraw in place on the alternate screen.
    Animate,
}

/// Console rendering is best effort: the first write error is logged and
/// disables the console for the rest of the run, so it never aborts the
/// simulation or the output file.
pub struct Console<W: Write> {
    out: W,
    mode: ConsoleMode,
    active: bool,
    broken: bool,
}

impl Console<Stdout> {
    /// Console on stdout. Animation needs a terminal the grid fits in;
    /// otherwise this degrades to plain output.
    pub fn stdout(mode: ConsoleMode, size: &Rect) -> Self {
        let out = io::stdout();
        let mode = match mode {
            ConsoleMode::Animate if !out.is_tty() => {
                tracing::warn!("stdout is not a terminal, falling back to plain output");
                ConsoleMode::Plain
            }
            ConsoleMode::Animate if !fits_terminal(size) => {
                tracing::warn!(rows = size.rows(), cols = size.cols(), "grid does not fit the terminal, falling back to plain output");
                ConsoleMode::Plain
            }
            mode => mode,
        };
        Console::new(out, mode)
    }
}

impl<W: Write> Console<W> {
    #[inline]
    pub fn new(out: W, mode: ConsoleMode) -> Self {
        Console {
            out,
            mode,
            active: false,
            broken: false,
        }
    }

    #[inline]
    pub fn mode(&self) -> ConsoleMode {
        self.mode
    }

    /// Set once a write has failed; nothing is rendered after that.
    #[inline]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn draw(&mut self, generation: u64, grid: &Grid) -> io::Result<()> {
        if self.mode == ConsoleMode::Animate {
            if !self.active {
                self.runup()?;
            }
            execute!(self.out, MoveTo(0, 0), Clear(ClearType::All))?;
        }
        write_block(&mut self.out, generation, grid, CONSOLE_MARKS)?;
        self.out.flush()
    }

    fn runup(&mut self) -> io::Result<()> {
        execute!(self.out, EnterAlternateScreen, SetTitle("Life"), Hide)?;
        self.active = true;
        Ok(())
    }

    fn leave(&mut self) -> io::Result<()> {
        if self.active {
            self.active = false;
            execute!(self.out, LeaveAlternateScreen, Show)?;
        }
        Ok(())
    }
}

impl<W: Write> GenerationSink for Console<W> {
    fn emit(&mut self, generation: u64, grid: &Grid) -> Result<()> {
        if self.broken {
            return Ok(());
        }
        if let Err(e) = self.draw(generation, grid) {
            tracing::warn!(generation, error = %e, "console output failed, disabling it");
            self.broken = true;
            let _ = self.leave();
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Err(e) = self.leave().and_then(|()| self.out.flush()) {
            if !self.broken {
                tracing::warn!(error = %e, "console output failed");
            }
            self.broken = true;
        }
        Ok(())
    }
}

impl<W: Write> Drop for Console<W> {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

fn fits_terminal(size: &Rect) -> bool {
    match terminal::size() {
        // label line and trailing blank line
        Ok((w, h)) => size.cols() <= w as usize && size.rows() + 2 <= h as usize,
        Err(_) => false,
    }
}

/// Keeps every emitted generation in memory.
#[derive(Debug, Default, Clone)]
pub struct History {
    frames: Vec<(u64, Grid)>,
}

impl History {
    #[inline]
    pub fn new() -> Self {
        History::default()
    }

    #[inline]
    pub fn frames(&self) -> &[(u64, Grid)] {
        &self.frames
    }

    pub fn grids(&self) -> impl Iterator<Item = &Grid> {
        self.frames.iter().map(|(_, g)| g)
    }

    #[inline]
    pub fn last(&self) -> Option<&Grid> {
        self.frames.last().map(|(_, g)| g)
    }
}

impl GenerationSink for History {
    fn emit(&mut self, generation: u64, grid: &Grid) -> Result<()> {
        self.frames.push((generation, grid.clone()));
        Ok(())
    }
}
