//! # Embedding rendering
//!
//! [`EmbeddingRenderer`] pairs each embedding point with its track metadata and lays
//! one or two reductions out as panels of a [`Figure`]. Drawing the figure is the
//! job of a [`RenderSink`]; [`HtmlSink`] writes an interactive plotly page.

use serde::Serialize;

use crate::dimred::Reduction;
use crate::error::{Result, TrackscapeError};
use crate::features::TrackRecord;

mod html;

pub use html::{write_html, HtmlSink};

/// Destination for a finished figure.
pub trait RenderSink {
    fn render(&mut self, figure: &Figure) -> Result<()>;
}

/// One marker in a panel, with the hover payload of its track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
    pub name: String,
    pub album: String,
    pub artists: String,
    pub url: String,
}

impl PlotPoint {
    /// Track name as an HTML link to the track page.
    pub fn hover_label(&self) -> String {
        format!(
            r#"<a href="{}">{}</a>"#,
            escape_html(&self.url),
            escape_html(&self.name)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    /// Free text drawn under the panel, e.g. the explained variance of a PCA.
    pub annotation: Option<String>,
    pub points: Vec<PlotPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub title: String,
    pub panels: Vec<Panel>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingRenderer {
    title: Option<String>,
    show_explained_variance: bool,
}

impl Default for EmbeddingRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingRenderer {
    pub fn new() -> Self {
        EmbeddingRenderer {
            title: None,
            show_explained_variance: true,
        }
    }

    /// Replaces the title derived from the reducer names.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn show_explained_variance(mut self, show: bool) -> Self {
        self.show_explained_variance = show;
        self
    }

    /// Lays out one panel per reduction, side by side in the given order.
    pub fn figure(&self, tracks: &[TrackRecord], reductions: &[&Reduction]) -> Result<Figure> {
        if reductions.is_empty() || reductions.len() > 2 {
            return Err(TrackscapeError::Render(format!(
                "expected one or two embeddings, got {}",
                reductions.len()
            )));
        }

        let panels = reductions
            .iter()
            .map(|reduction| self.panel(tracks, reduction))
            .collect::<Result<Vec<_>>>()?;

        let title = self.title.clone().unwrap_or_else(|| {
            let methods: Vec<&str> = reductions.iter().map(|r| r.method).collect();
            format!("{} Visualization of Audio Features", methods.join(" and "))
        });

        Ok(Figure { title, panels })
    }

    pub fn render<S: RenderSink + ?Sized>(
        &self,
        tracks: &[TrackRecord],
        reductions: &[&Reduction],
        sink: &mut S,
    ) -> Result<()> {
        let figure = self.figure(tracks, reductions)?;
        sink.render(&figure)
    }

    fn panel(&self, tracks: &[TrackRecord], reduction: &Reduction) -> Result<Panel> {
        if reduction.embedding.len() != tracks.len() {
            return Err(TrackscapeError::Render(format!(
                "{} embedding has {} points for {} tracks",
                reduction.method,
                reduction.embedding.len(),
                tracks.len()
            )));
        }

        let points = tracks
            .iter()
            .zip(reduction.embedding.points())
            .map(|(track, [x, y])| PlotPoint {
                x,
                y,
                name: track.name.clone(),
                album: track.album.clone(),
                artists: track.artist_display(),
                url: track.url.clone(),
            })
            .collect();

        let annotation = if self.show_explained_variance {
            reduction
                .explained_variance
                .map(|ev| format!("Explained variance: {}", ev))
        } else {
            None
        };

        let [x_title, y_title] = reduction.axis_titles.clone();
        Ok(Panel {
            title: reduction.method.to_string(),
            x_title,
            y_title,
            annotation,
            points,
        })
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
