//! Self-contained HTML page drawing a [`Figure`] with plotly.js.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use super::{escape_html, Figure, Panel, RenderSink};
use crate::error::{Result, TrackscapeError};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// Writes the figure to an HTML file that opens as an interactive chart.
#[derive(Debug, Clone)]
pub struct HtmlSink {
    path: PathBuf,
}

impl HtmlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        HtmlSink { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RenderSink for HtmlSink {
    fn render(&mut self, figure: &Figure) -> Result<()> {
        let file = File::create(&self.path).map_err(|e| {
            TrackscapeError::Render(format!("cannot create {}: {}", self.path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);
        write_html(&mut writer, figure)
            .and_then(|_| writer.flush())
            .map_err(|e| {
                TrackscapeError::Render(format!("cannot write {}: {}", self.path.display(), e))
            })?;
        log::info!("wrote chart to {}", self.path.display());
        Ok(())
    }
}

pub fn write_html<W: Write>(writer: &mut W, figure: &Figure) -> io::Result<()> {
    let data: Vec<Value> = figure
        .panels
        .iter()
        .enumerate()
        .map(|(i, panel)| trace(i, panel))
        .collect();
    let layout = layout(figure);

    // Keep "</script>" inside string data from closing the script element
    let data = serde_json::to_string(&data)?.replace("</", "<\\/");
    let layout = serde_json::to_string(&layout)?.replace("</", "<\\/");

    write!(
        writer,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <script src="{cdn}"></script>
    <style>
        html, body {{ margin: 0; height: 100%; font-family: -apple-system, 'Segoe UI', Helvetica, Arial, sans-serif; }}
        #chart {{ width: 100%; height: 100%; }}
    </style>
</head>
<body>
    <div id="chart"></div>
    <script>
        const data = {data};
        const layout = {layout};
        Plotly.newPlot('chart', data, layout, {{ responsive: true }});
        document.getElementById('chart').on('plotly_click', (event) => {{
            const url = event.points[0].customdata[2];
            if (url) {{ window.open(url, '_blank'); }}
        }});
    </script>
</body>
</html>
"#,
        title = escape_html(&figure.title),
        cdn = PLOTLY_CDN,
        data = data,
        layout = layout,
    )
}

fn axis_suffix(index: usize) -> String {
    if index == 0 {
        String::new()
    } else {
        (index + 1).to_string()
    }
}

fn trace(index: usize, panel: &Panel) -> Value {
    let suffix = axis_suffix(index);
    let x: Vec<f64> = panel.points.iter().map(|p| p.x).collect();
    let y: Vec<f64> = panel.points.iter().map(|p| p.y).collect();
    let text: Vec<String> = panel.points.iter().map(|p| p.hover_label()).collect();
    let customdata: Vec<[&str; 3]> = panel
        .points
        .iter()
        .map(|p| [p.album.as_str(), p.artists.as_str(), p.url.as_str()])
        .collect();

    json!({
        "type": "scatter",
        "name": panel.title,
        "x": x,
        "y": y,
        "xaxis": format!("x{}", suffix),
        "yaxis": format!("y{}", suffix),
        "mode": "markers+text",
        "text": text,
        "textposition": "top center",
        "textfont": { "size": 9 },
        "customdata": customdata,
        "hovertemplate": "%{text}<br>%{customdata[0]}<br>%{customdata[1]}<extra></extra>",
        "marker": { "size": 10, "symbol": "circle-open" },
        "showlegend": false,
    })
}

fn layout(figure: &Figure) -> Value {
    let columns = figure.panels.len().max(1);
    let width = 1.0 / columns as f64;
    let gap = 0.04;

    let mut layout = json!({
        "title": { "text": escape_html(&figure.title) },
        "hovermode": "closest",
        "margin": { "b": 90 },
    });
    let mut annotations = Vec::new();

    for (i, panel) in figure.panels.iter().enumerate() {
        let suffix = axis_suffix(i);
        let start = i as f64 * width + if i > 0 { gap } else { 0.0 };
        let end = (i + 1) as f64 * width - if i + 1 < columns { gap } else { 0.0 };
        let center = (start + end) / 2.0;

        layout[format!("xaxis{}", suffix)] = json!({
            "title": { "text": escape_html(&panel.x_title) },
            "domain": [start, end],
            "anchor": format!("y{}", suffix),
        });
        layout[format!("yaxis{}", suffix)] = json!({
            "title": { "text": escape_html(&panel.y_title) },
            "anchor": format!("x{}", suffix),
        });

        annotations.push(json!({
            "text": escape_html(&panel.title),
            "x": center,
            "y": 1.0,
            "xref": "paper",
            "yref": "paper",
            "xanchor": "center",
            "yanchor": "bottom",
            "showarrow": false,
            "font": { "size": 16 },
        }));
        if let Some(note) = &panel.annotation {
            annotations.push(json!({
                "text": escape_html(note),
                "x": center,
                "y": -0.12,
                "xref": "paper",
                "yref": "paper",
                "xanchor": "center",
                "yanchor": "top",
                "showarrow": false,
            }));
        }
    }

    layout["annotations"] = Value::Array(annotations);
    layout
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PlotPoint;

    fn figure(panels: usize) -> Figure {
        let panel = Panel {
            title: "PCA".to_string(),
            x_title: "Principal Component 1".to_string(),
            y_title: "Principal Component 2".to_string(),
            annotation: Some("Explained variance: PC1 60.0%".to_string()),
            points: vec![PlotPoint {
                x: 0.5,
                y: -0.25,
                name: "</script><b>".to_string(),
                album: "Album".to_string(),
                artists: "Band".to_string(),
                url: "https://open.example.com/track/1".to_string(),
            }],
        };
        Figure {
            title: "Audio map".to_string(),
            panels: vec![panel; panels],
        }
    }

    #[test]
    fn test_html_contains_plot() {
        let mut out = Vec::new();
        write_html(&mut out, &figure(1)).unwrap();
        let html = String::from_utf8(out).unwrap();

        assert!(html.contains("<title>Audio map</title>"));
        assert!(html.contains("Plotly.newPlot"));
        assert!(html.contains("Principal Component 1"));
        assert!(html.contains("https://open.example.com/track/1"));
        assert_eq!(html.matches("</script>").count(), 2);
    }

    #[test]
    fn test_second_panel_uses_own_axes() {
        let layout = layout(&figure(2));
        assert_eq!(layout["xaxis2"]["anchor"], "y2");
        assert_eq!(layout["yaxis"]["anchor"], "x");
        assert_eq!(layout["annotations"].as_array().unwrap().len(), 4);

        let second = trace(1, &figure(2).panels[1]);
        assert_eq!(second["xaxis"], "x2");
    }

    #[test]
    fn test_layout_text_is_escaped() {
        let mut figure = figure(1);
        figure.title = "Tom & Jerry".to_string();
        figure.panels[0].x_title = "<i>Energy</i>".to_string();
        figure.panels[0].y_title = "A & B".to_string();

        let layout = layout(&figure);
        assert_eq!(layout["title"]["text"], "Tom &amp; Jerry");
        assert_eq!(layout["xaxis"]["title"]["text"], "&lt;i&gt;Energy&lt;/i&gt;");
        assert_eq!(layout["yaxis"]["title"]["text"], "A &amp; B");
    }

    #[test]
    fn test_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.html");
        let mut sink = HtmlSink::new(&path);

        sink.render(&figure(2)).unwrap();

        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("xaxis2"));
    }

    #[test]
    fn test_sink_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = HtmlSink::new(dir.path().join("missing").join("chart.html"));
        let err = sink.render(&figure(1)).unwrap_err();
        assert!(matches!(err, TrackscapeError::Render(_)));
    }
}
