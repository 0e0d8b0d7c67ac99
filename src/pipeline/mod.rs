//! # Pipeline
//!
//! Runs collection, feature-matrix construction, standardization, one or both
//! reducers and rendering for a single query. In [`VisualizationMode::Combined`]
//! both reducers consume the very same [`StandardizedMatrix`].

use crate::collect::{CatalogSource, Collector};
use crate::dimred::{LinearReducer, NeighborReducer, Perplexity, Reducer, Reduction, TsneBuilder};
use crate::error::{Result, TrackscapeError};
use crate::features::{FeatureMatrixBuilder, TrackRecord};
use crate::render::{EmbeddingRenderer, RenderSink};
use crate::standardize::{StandardizedMatrix, Standardizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisualizationMode {
    /// PCA only.
    Linear,
    /// t-SNE only.
    Neighbor,
    /// PCA and t-SNE side by side.
    #[default]
    Combined,
}

/// Everything computed for one batch, independent of whether rendering succeeds.
#[derive(Debug, Clone)]
pub struct Projection {
    pub tracks: Vec<TrackRecord>,
    pub standardized: StandardizedMatrix,
    pub reductions: Vec<Reduction>,
}

impl Projection {
    /// Reduction produced by the reducer called `method`, e.g. `"PCA"`.
    pub fn reduction(&self, method: &str) -> Option<&Reduction> {
        self.reductions.iter().find(|r| r.method == method)
    }
}

pub struct PipelineBuilder {
    mode: VisualizationMode,
    tsne: TsneBuilder,
    title: Option<String>,
    show_explained_variance: bool,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        PipelineBuilder {
            mode: VisualizationMode::default(),
            tsne: TsneBuilder::new(),
            title: None,
            show_explained_variance: true,
        }
    }

    pub fn mode(mut self, mode: VisualizationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.tsne = self.tsne.seed(seed);
        self
    }

    pub fn perplexity(mut self, perplexity: Perplexity) -> Self {
        self.tsne = self.tsne.perplexity(perplexity);
        self
    }

    /// Full control over the t-SNE settings; replaces any earlier `seed` or `perplexity`.
    pub fn tsne(mut self, tsne: TsneBuilder) -> Self {
        self.tsne = tsne;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn show_explained_variance(mut self, show: bool) -> Self {
        self.show_explained_variance = show;
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let mut renderer =
            EmbeddingRenderer::new().show_explained_variance(self.show_explained_variance);
        if let Some(title) = self.title {
            renderer = renderer.title(title);
        }
        Ok(Pipeline {
            mode: self.mode,
            linear: LinearReducer::new(),
            neighbor: self.tsne.build()?,
            renderer,
        })
    }
}

#[derive(Debug)]
pub struct Pipeline {
    mode: VisualizationMode,
    linear: LinearReducer,
    neighbor: NeighborReducer,
    renderer: EmbeddingRenderer,
}

impl Pipeline {
    pub fn mode(&self) -> VisualizationMode {
        self.mode
    }

    fn reducers(&self) -> Vec<&dyn Reducer> {
        let linear: &dyn Reducer = &self.linear;
        let neighbor: &dyn Reducer = &self.neighbor;
        match self.mode {
            VisualizationMode::Linear => vec![linear],
            VisualizationMode::Neighbor => vec![neighbor],
            VisualizationMode::Combined => vec![linear, neighbor],
        }
    }

    /// Builds, standardizes and reduces the feature matrix of `tracks`.
    pub fn project(&self, tracks: Vec<TrackRecord>) -> Result<Projection> {
        if tracks.is_empty() {
            return Err(TrackscapeError::EmptyResult);
        }

        let reducers = self.reducers();
        for reducer in &reducers {
            reducer.validate(tracks.len())?;
        }

        let matrix = FeatureMatrixBuilder::new().build(&tracks)?;
        let standardized = Standardizer::new().standardize(&matrix);
        log::info!(
            "standardized {} tracks x {} features ({} constant)",
            standardized.nrows(),
            standardized.ncols(),
            standardized.degenerate_columns().len()
        );

        let reductions = reducers
            .iter()
            .map(|reducer| reducer.reduce(&standardized))
            .collect::<Result<Vec<_>>>()?;

        Ok(Projection {
            tracks,
            standardized,
            reductions,
        })
    }

    pub fn render<S: RenderSink + ?Sized>(&self, projection: &Projection, sink: &mut S) -> Result<()> {
        let reductions: Vec<&Reduction> = projection.reductions.iter().collect();
        self.renderer.render(&projection.tracks, &reductions, sink)
    }

    /// Collects the tracks for `query`, projects them and renders the result.
    ///
    /// A failing sink does not discard the work: the error is returned alongside the
    /// projection so callers can still inspect the embeddings.
    pub fn run<C, S>(
        &self,
        query: &str,
        collector: &Collector<C>,
        sink: &mut S,
    ) -> Result<(Projection, Result<()>)>
    where
        C: CatalogSource,
        S: RenderSink + ?Sized,
    {
        let tracks = collector.collect(query)?;
        let projection = self.project(tracks)?;
        let rendered = self.render(&projection, sink);
        if let Err(e) = &rendered {
            log::error!("rendering failed: {}", e);
        }
        Ok((projection, rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::track;
    use crate::render::Figure;

    #[derive(Default)]
    struct CollectingSink {
        figures: Vec<Figure>,
    }

    impl RenderSink for CollectingSink {
        fn render(&mut self, figure: &Figure) -> Result<()> {
            self.figures.push(figure.clone());
            Ok(())
        }
    }

    fn tracks() -> Vec<TrackRecord> {
        vec![
            track("loud", [0.9, 0.95, -3.0, 0.10, 0.02, 0.00, 0.30, 0.80, 170.0]),
            track("quiet", [0.2, 0.10, -22.0, 0.03, 0.95, 0.85, 0.08, 0.15, 65.0]),
            track("middle", [0.5, 0.55, -9.0, 0.06, 0.40, 0.20, 0.15, 0.50, 110.0]),
        ]
    }

    fn pipeline(mode: VisualizationMode) -> Pipeline {
        PipelineBuilder::new()
            .mode(mode)
            .perplexity(Perplexity::Fixed(1.0))
            .build()
            .unwrap()
    }

    #[test]
    fn test_combined_mode_shares_standardized_matrix() {
        let projection = pipeline(VisualizationMode::Combined)
            .project(tracks())
            .unwrap();

        assert_eq!(projection.reductions.len(), 2);
        assert_eq!(projection.standardized.nrows(), 3);
        assert!(projection.reduction("PCA").is_some());
        assert!(projection.reduction("t-SNE").is_some());
        for reduction in &projection.reductions {
            assert_eq!(reduction.embedding.len(), 3);
            assert!(reduction.embedding.is_finite());
        }
    }

    #[test]
    fn test_single_modes() {
        let linear = pipeline(VisualizationMode::Linear).project(tracks()).unwrap();
        assert_eq!(linear.reductions.len(), 1);
        assert!(linear.reductions[0].explained_variance.is_some());

        let neighbor = pipeline(VisualizationMode::Neighbor)
            .project(tracks())
            .unwrap();
        assert_eq!(neighbor.reductions[0].method, "t-SNE");
    }

    #[test]
    fn test_empty_batch() {
        let err = pipeline(VisualizationMode::Combined)
            .project(Vec::new())
            .unwrap_err();
        assert!(matches!(err, TrackscapeError::EmptyResult));
    }

    #[test]
    fn test_preconditions_checked_before_reducing() {
        let err = PipelineBuilder::new()
            .perplexity(Perplexity::Fixed(5.0))
            .build()
            .unwrap()
            .project(tracks())
            .unwrap_err();
        assert!(matches!(
            err,
            TrackscapeError::InsufficientSamples {
                reducer: "t-SNE",
                ..
            }
        ));

        let err = pipeline(VisualizationMode::Linear)
            .project(tracks()[..2].to_vec())
            .unwrap_err();
        assert!(matches!(
            err,
            TrackscapeError::InsufficientSamples { reducer: "PCA", .. }
        ));
    }

    #[test]
    fn test_render_combined_figure() {
        let pipeline = pipeline(VisualizationMode::Combined);
        let projection = pipeline.project(tracks()).unwrap();
        let mut sink = CollectingSink::default();

        pipeline.render(&projection, &mut sink).unwrap();

        let figure = &sink.figures[0];
        assert_eq!(figure.panels.len(), 2);
        assert!(figure.panels[0].annotation.is_some());
        assert!(figure.panels[1].annotation.is_none());
        assert_eq!(figure.panels[1].points[1].name, "quiet name");
    }
}
