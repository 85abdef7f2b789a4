use axum::{
    Json,
    extract::{Path, State},
};
use scp_core::{
    model::{annotation::SelectedAnnotation, cluster::{AxisLabels, ClusterGroup}},
    plot::{
        TraceMap,
        range::{Aspect, DomainRanges, compute_aspect_ratios, set_range},
        traces::{PointData, ScatterTrace, cluster_traces},
    },
};
use serde::{Deserialize, Serialize};
use valuable::Valuable;

use super::{
    context::{load_cluster, point_data, resolve_annotation, subsample_threshold, viewable_study, viewer},
    error::Result,
    handler::QueryParams,
};
use crate::server::{AppState, auth::SignedIn};

#[derive(Debug, Default, Deserialize, Valuable)]
#[serde(default)]
pub(super) struct ClusterQuery {
    pub cluster: Option<String>,
    pub annotation: Option<String>,
    pub subsample: Option<String>,
}

/// Axis layout shared by every scatter plot of a cluster.
#[derive(Debug, Serialize)]
pub(super) struct Layout {
    pub plot_type: &'static str,
    pub is_3d: bool,
    pub range: DomainRanges,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect: Option<Aspect>,
    pub axes: AxisLabels,
}

impl Layout {
    /// Aspect ratios are only meaningful for 3d clusters with explicit ranges.
    pub(super) fn new(cluster: &ClusterGroup, points: &PointData) -> Self {
        let range = set_range(cluster.domain_ranges, &points.x, &points.y, points.z.as_deref());
        let aspect = (cluster.is_3d() && cluster.has_range()).then(|| compute_aspect_ratios(&range));

        Self {
            plot_type: cluster.plot_type(),
            is_3d: cluster.is_3d(),
            range,
            aspect,
            axes: cluster.axis_labels(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ClusterPlot {
    cluster: String,
    annotation: SelectedAnnotation,
    #[serde(flatten)]
    layout: Layout,
    traces: TraceMap<ScatterTrace>,
}

pub(super) async fn render_cluster(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    QueryParams(query): QueryParams<ClusterQuery>,
) -> Result<Json<ClusterPlot>> {
    tracing::debug!(deserialized_query = query.as_value());

    let viewer = viewer(user.as_ref());
    let store = app_state.store();

    let study = viewable_study(&study_name, viewer.as_ref(), store).await?;
    let cluster = load_cluster(&study, query.cluster.as_deref(), store).await?;
    let annotation = resolve_annotation(&study, &cluster, query.annotation.as_deref(), viewer.as_ref(), store).await?;

    let points = point_data(&cluster, &annotation, subsample_threshold(query.subsample.as_deref()), store).await?;

    let colorscale = study.custom_colorscale_for(&annotation.selector());
    let traces = cluster_traces(&points, &annotation.selected, &study.plot_style(), colorscale);

    Ok(Json(ClusterPlot {
        layout: Layout::new(&cluster, &points),
        cluster: cluster.name,
        annotation: annotation.selected,
        traces,
    }))
}
