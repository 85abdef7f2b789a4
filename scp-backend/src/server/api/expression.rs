//! Gene search, expression plots and the text exports behind the heatmap.

use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use garde::Validate;
use scp_core::{
    gct::{RowCentering, annotation_tsv, expression_gct, precomputed_gct},
    model::{
        annotation::SelectedAnnotation,
        cluster::ClusterGroup,
        expression::{Consensus, ExpressionScore, divide_genes_for_header, parse_search_terms},
        study::{Study, Viewer},
    },
    plot::{
        TraceMap,
        dot_plot::{DotPlot, dot_plot},
        expression::Expression,
        traces::{BoxTrace, ScatterTrace, annotation_scatter, cluster_traces, expression_boxplots, expression_scatter},
    },
};
use serde::{Deserialize, Serialize};
use valuable::Valuable;

use super::{
    cluster::Layout,
    context::{
        AnnotationOptions, ResolvedAnnotation, annotation_options, cluster_cells, load_cluster, point_data,
        resolve_annotation, subsample_threshold, viewable_study, viewer,
    },
    error::{Error, Result},
    handler::{QueryParams, ValidJson},
};
use crate::{
    db::{
        Store,
        model::{
            cluster::fetch_clusters,
            expression::{fetch_gene, fetch_genes, fetch_precomputed_score},
        },
    },
    server::{AppState, auth::SignedIn},
};

#[derive(Debug, Default, Deserialize, Valuable)]
#[serde(default)]
pub(super) struct ExpressionQuery {
    cluster: Option<String>,
    annotation: Option<String>,
    subsample: Option<String>,
    search_terms: Option<String>,
    gene_set: Option<String>,
    consensus: Option<String>,
    row_centered: Option<String>,
    plot_type: Option<String>,
}

impl ExpressionQuery {
    fn consensus(&self) -> Result<Consensus> {
        match self.consensus.as_deref().filter(|c| !c.is_empty()) {
            Some(raw) => raw.parse().map_err(|_| Error::SimpleData {
                reason: format!("unknown consensus method '{raw}'"),
            }),
            None => Ok(Consensus::default()),
        }
    }

    fn row_centering(&self) -> Result<RowCentering> {
        let raw = self.row_centered.as_deref().unwrap_or_default();

        raw.parse().map_err(|_| Error::SimpleData {
            reason: format!("unknown row centering '{raw}'"),
        })
    }

    fn box_plot_type(&self) -> &'static str {
        match self.plot_type.as_deref() {
            Some("box") => "box",
            _ => "violin",
        }
    }
}

/// Everything a plot route resolves before it can render.
struct PlotContext {
    study: Study,
    cluster: ClusterGroup,
    annotation: ResolvedAnnotation,
    viewer: Option<Viewer>,
}

async fn plot_context(
    user: Option<SignedIn>,
    study_name: &str,
    query: &ExpressionQuery,
    store: &Store,
) -> Result<PlotContext> {
    tracing::debug!(deserialized_query = query.as_value());

    let viewer = viewer(user.as_ref());

    let study = viewable_study(study_name, viewer.as_ref(), store).await?;
    let cluster = load_cluster(&study, query.cluster.as_deref(), store).await?;
    let annotation = resolve_annotation(&study, &cluster, query.annotation.as_deref(), viewer.as_ref(), store).await?;

    Ok(PlotContext {
        study,
        cluster,
        annotation,
        viewer,
    })
}

/// The genes of a query: a named precomputed gene list, or free search terms.
async fn gene_set(study: &Study, query: &ExpressionQuery, store: &Store) -> Result<(Vec<ExpressionScore>, Vec<String>)> {
    let terms = match query.gene_set.as_deref().filter(|g| !g.is_empty()) {
        Some(name) => fetch_precomputed_score(&study.id, name, store)
            .await
            .map_err(|_| Error::not_found(format!("gene list {name}")))?
            .gene_list(),
        None => parse_search_terms(query.search_terms.as_deref().unwrap_or_default()),
    };

    if terms.is_empty() {
        return Err(Error::SimpleData {
            reason: "no genes were requested".to_string(),
        });
    }

    let (genes, not_found) = fetch_genes(&study.id, &terms, store).await?;
    if genes.is_empty() {
        return Err(Error::not_found(format!("genes {}", not_found.join(", "))));
    }

    Ok((genes, not_found))
}

async fn single_gene(study: &Study, gene: &str, store: &Store) -> Result<ExpressionScore> {
    fetch_gene(&study.id, gene, store)
        .await?
        .ok_or_else(|| Error::not_found(format!("gene {gene}")))
}

#[derive(Debug, Deserialize, Validate)]
#[garde(allow_unvalidated)]
pub(super) struct GeneSearch {
    #[garde(length(min = 1))]
    genes: String,
    #[serde(default)]
    consensus: Option<Consensus>,
    #[serde(default)]
    cluster: Option<String>,
    #[serde(default)]
    annotation: Option<String>,
    #[serde(default)]
    subsample: Option<String>,
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Sends a single gene to its own page, a gene set with a consensus method to
/// the consensus page and anything else to the heatmap.
pub(super) async fn search_genes(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    ValidJson(search): ValidJson<GeneSearch>,
) -> Result<Redirect> {
    let viewer = viewer(user.as_ref());
    let store = app_state.store();
    let study = viewable_study(&study_name, viewer.as_ref(), store).await?;

    let terms = parse_search_terms(&search.genes);
    let (genes, not_found) = fetch_genes(&study.id, &terms, store).await?;
    if genes.is_empty() {
        return Err(Error::not_found(format!("genes {}", not_found.join(", "))));
    }

    let mut params = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in [
        ("cluster", &search.cluster),
        ("annotation", &search.annotation),
        ("subsample", &search.subsample),
    ] {
        if let Some(value) = value {
            params.append_pair(key, value);
        }
    }

    let base = format!("/study/{}", study.url_safe_name);
    let location = match (genes.as_slice(), search.consensus) {
        ([gene], _) => format!("{base}/gene_expression/{}", encode(&gene.gene)),
        (_, Some(consensus)) => {
            params.append_pair("search_terms", &genes.iter().map(|g| g.gene.as_str()).collect::<Vec<_>>().join(" "));
            params.append_pair("consensus", &consensus.to_string());
            format!("{base}/gene_set_expression")
        }
        _ => {
            params.append_pair("search_terms", &genes.iter().map(|g| g.gene.as_str()).collect::<Vec<_>>().join(" "));
            format!("{base}/gene_expression")
        }
    };

    let params = params.finish();
    let location = if params.is_empty() {
        location
    } else {
        format!("{location}?{params}")
    };

    tracing::debug!(%location, not_found = ?not_found, "redirecting gene search");

    Ok(Redirect::to(&location))
}

#[derive(Debug, Serialize)]
pub(super) struct ExpressionView {
    study: String,
    genes: Vec<String>,
    header_genes: Vec<String>,
    more_genes: Vec<String>,
    not_found: Vec<String>,
    cluster: String,
    clusters: Vec<String>,
    annotation: SelectedAnnotation,
    annotations: AnnotationOptions,
    plot_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    consensus: Option<Consensus>,
    expression_label: String,
}

async fn expression_view(
    context: PlotContext,
    genes: Vec<String>,
    not_found: Vec<String>,
    consensus: Option<Consensus>,
    query: &ExpressionQuery,
    store: &Store,
) -> Result<ExpressionView> {
    let PlotContext {
        study,
        cluster,
        annotation,
        viewer,
    } = context;

    let clusters = fetch_clusters(&study.id, store).await?.into_iter().map(|c| c.name).collect();
    let annotations = annotation_options(&study, &cluster, viewer.as_ref(), store).await?;
    let (header_genes, more_genes) = divide_genes_for_header(&genes);

    let plot_type = if annotation.selected.is_numeric() {
        "scatter"
    } else {
        query.box_plot_type()
    };

    Ok(ExpressionView {
        study: study.url_safe_name.clone(),
        genes,
        header_genes,
        more_genes,
        not_found,
        cluster: cluster.name,
        clusters,
        annotation: annotation.selected,
        annotations,
        plot_type,
        consensus,
        expression_label: study.plot_style().expression_label,
    })
}

pub(super) async fn view_gene_expression(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path((study_name, gene)): Path<(String, String)>,
    QueryParams(query): QueryParams<ExpressionQuery>,
) -> Result<Json<ExpressionView>> {
    let store = app_state.store();
    let context = plot_context(user, &study_name, &query, store).await?;
    let gene = single_gene(&context.study, &gene, store).await?;

    Ok(Json(expression_view(context, vec![gene.gene], Vec::new(), None, &query, store).await?))
}

pub(super) async fn view_gene_set_expression(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    QueryParams(query): QueryParams<ExpressionQuery>,
) -> Result<Json<ExpressionView>> {
    let store = app_state.store();
    let context = plot_context(user, &study_name, &query, store).await?;
    let (genes, not_found) = gene_set(&context.study, &query, store).await?;
    let genes = genes.into_iter().map(|g| g.gene).collect();

    Ok(Json(
        expression_view(context, genes, not_found, Some(query.consensus()?), &query, store).await?,
    ))
}

/// Box/violin traces for group annotations, an annotation-vs-expression
/// scatter for numeric ones.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum DistributionTraces {
    Groups(TraceMap<BoxTrace>),
    Numeric(TraceMap<ScatterTrace>),
}

#[derive(Debug, Serialize)]
pub(super) struct ExpressionPlots {
    annotation: SelectedAnnotation,
    plot_type: &'static str,
    values: DistributionTraces,
    expression: TraceMap<ScatterTrace>,
    #[serde(rename = "static")]
    annotations: TraceMap<ScatterTrace>,
    expression_label: String,
    #[serde(flatten)]
    layout: Layout,
}

async fn expression_plots(
    context: &PlotContext,
    expression: &Expression<'_>,
    query: &ExpressionQuery,
    store: &Store,
) -> Result<ExpressionPlots> {
    let PlotContext {
        study,
        cluster,
        annotation,
        ..
    } = context;

    let points = point_data(cluster, annotation, subsample_threshold(query.subsample.as_deref()), store).await?;
    let style = study.plot_style();
    let selected = &annotation.selected;

    let (plot_type, values) = if selected.is_numeric() {
        let traces = annotation_scatter(&points.cells, &points.annotations, selected, expression, &style);
        ("scatter", DistributionTraces::Numeric(traces))
    } else {
        let traces = expression_boxplots(&points.cells, &points.annotations, selected, expression);
        (query.box_plot_type(), DistributionTraces::Groups(traces))
    };

    let colorscale = study.custom_colorscale_for(&annotation.selector());

    Ok(ExpressionPlots {
        annotation: selected.clone(),
        plot_type,
        values,
        expression: expression_scatter(&points, selected, expression, &style),
        annotations: cluster_traces(&points, selected, &style, colorscale),
        expression_label: expression.axis_title(&style.expression_label),
        layout: Layout::new(cluster, &points),
    })
}

pub(super) async fn render_gene_expression_plots(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path((study_name, gene)): Path<(String, String)>,
    QueryParams(query): QueryParams<ExpressionQuery>,
) -> Result<Json<ExpressionPlots>> {
    let store = app_state.store();
    let context = plot_context(user, &study_name, &query, store).await?;
    let gene = single_gene(&context.study, &gene, store).await?;

    Ok(Json(
        expression_plots(&context, &Expression::Gene(&gene), &query, store).await?,
    ))
}

pub(super) async fn render_gene_set_expression_plots(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    QueryParams(query): QueryParams<ExpressionQuery>,
) -> Result<Json<ExpressionPlots>> {
    let store = app_state.store();
    let context = plot_context(user, &study_name, &query, store).await?;
    let (genes, _) = gene_set(&context.study, &query, store).await?;

    let expression = Expression::Consensus {
        genes: &genes,
        method: query.consensus()?,
    };

    Ok(Json(expression_plots(&context, &expression, &query, store).await?))
}

#[derive(Debug, Serialize)]
pub(super) struct HeatmapView {
    genes: Vec<String>,
    header_genes: Vec<String>,
    more_genes: Vec<String>,
    not_found: Vec<String>,
    cluster: String,
    annotation: SelectedAnnotation,
    row_centered: String,
}

/// The heatmap page; the matrix itself comes from `expression_query`.
pub(super) async fn view_heatmap(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    QueryParams(query): QueryParams<ExpressionQuery>,
) -> Result<Json<HeatmapView>> {
    let store = app_state.store();
    let context = plot_context(user, &study_name, &query, store).await?;
    let (genes, not_found) = gene_set(&context.study, &query, store).await?;
    query.row_centering()?;

    let genes: Vec<String> = genes.into_iter().map(|g| g.gene).collect();
    let (header_genes, more_genes) = divide_genes_for_header(&genes);

    Ok(Json(HeatmapView {
        genes,
        header_genes,
        more_genes,
        not_found,
        cluster: context.cluster.name,
        annotation: context.annotation.selected,
        row_centered: query.row_centered.unwrap_or_default(),
    }))
}

fn plain_text(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

pub(super) async fn expression_query(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    QueryParams(query): QueryParams<ExpressionQuery>,
) -> Result<Response> {
    let store = app_state.store();
    let context = plot_context(user, &study_name, &query, store).await?;
    let (genes, _) = gene_set(&context.study, &query, store).await?;
    let centering = query.row_centering()?;

    let cells = cluster_cells(&context.cluster, store).await?;

    Ok(plain_text(expression_gct(&genes, &cells, centering)))
}

pub(super) async fn annotation_query(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    QueryParams(query): QueryParams<ExpressionQuery>,
) -> Result<Response> {
    let store = app_state.store();
    let context = plot_context(user, &study_name, &query, store).await?;

    let cells = cluster_cells(&context.cluster, store).await?;
    let points = point_data(&context.cluster, &context.annotation, None, store).await?;
    let values: Vec<_> = cells
        .iter()
        .enumerate()
        .map(|(index, cell)| points.annotations.value_for(index, cell).cloned())
        .collect();

    Ok(plain_text(annotation_tsv(&context.annotation.selected.name, &cells, &values)))
}

pub(super) async fn annotation_values(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    QueryParams(query): QueryParams<ExpressionQuery>,
) -> Result<Json<SelectedAnnotation>> {
    let context = plot_context(user, &study_name, &query, app_state.store()).await?;

    Ok(Json(context.annotation.selected))
}

pub(super) async fn get_new_annotations(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    QueryParams(query): QueryParams<ExpressionQuery>,
) -> Result<Json<AnnotationOptions>> {
    let viewer = viewer(user.as_ref());
    let store = app_state.store();

    let study = viewable_study(&study_name, viewer.as_ref(), store).await?;
    let cluster = load_cluster(&study, query.cluster.as_deref(), store).await?;

    Ok(Json(annotation_options(&study, &cluster, viewer.as_ref(), store).await?))
}

pub(super) async fn precomputed_results(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    QueryParams(query): QueryParams<ExpressionQuery>,
) -> Result<Response> {
    let viewer = viewer(user.as_ref());
    let store = app_state.store();
    let study = viewable_study(&study_name, viewer.as_ref(), store).await?;

    let name = query.gene_set.as_deref().unwrap_or_default();
    let score = fetch_precomputed_score(&study.id, name, store)
        .await
        .map_err(|_| Error::not_found(format!("gene list {name}")))?;
    let row_centered = query.row_centered.as_deref() == Some("1");

    Ok(plain_text(precomputed_gct(&score, row_centered)))
}

pub(super) async fn render_dot_plot(
    user: Option<SignedIn>,
    State(app_state): State<AppState>,
    Path(study_name): Path<String>,
    QueryParams(query): QueryParams<ExpressionQuery>,
) -> Result<Json<DotPlot>> {
    let store = app_state.store();
    let context = plot_context(user, &study_name, &query, store).await?;

    if context.annotation.selected.is_numeric() {
        return Err(Error::SimpleData {
            reason: "dot plots need a group annotation".to_string(),
        });
    }

    let (genes, _) = gene_set(&context.study, &query, store).await?;
    let points = point_data(&context.cluster, &context.annotation, None, store).await?;

    Ok(Json(dot_plot(
        &genes,
        &points.cells,
        &points.annotations,
        &context.annotation.selected,
    )))
}
