use chrono::{DateTime, NaiveDate, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Endpoint, annotation::AnnotationSelector};
use crate::plot::{COLORSCALE_THEMES, PlotStyle};

const ENDPOINT: &str = "/studies";

pub const DEFAULT_POINT_SIZE: f64 = 3.0;
pub const DEFAULT_EXPRESSION_LABEL: &str = "Expression";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, valuable::Valuable)]
#[serde(rename_all = "snake_case")]
pub enum SharePermission {
    View,
    Reviewer,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyShare {
    pub email: String,
    pub permission: SharePermission,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
#[garde(allow_unvalidated)]
pub struct DefaultOptions {
    pub cluster: Option<String>,
    #[garde(custom(is_annotation_selector))]
    pub annotation: Option<String>,
    #[garde(custom(is_colorscale))]
    pub color_profile: Option<String>,
    pub expression_label: Option<String>,
    pub deliver_emails: Option<bool>,
    #[garde(range(min = 0.0))]
    pub cluster_point_size: Option<f64>,
    #[garde(range(min = 0.0, max = 1.0))]
    pub cluster_point_alpha: Option<f64>,
    pub cluster_point_border: Option<bool>,
}

fn is_annotation_selector(value: &Option<String>, _: &()) -> garde::Result {
    match value {
        Some(selector) => selector
            .parse::<AnnotationSelector>()
            .map(|_| ())
            .map_err(|e| garde::Error::new(e.to_string())),
        None => Ok(()),
    }
}

fn is_colorscale(value: &Option<String>, _: &()) -> garde::Result {
    match value {
        Some(profile) if !COLORSCALE_THEMES.contains(&profile.as_str()) => {
            Err(garde::Error::new(format!("unknown color profile '{profile}'")))
        }
        _ => Ok(()),
    }
}

impl DefaultOptions {
    fn merge(&mut self, other: Self) {
        let Self {
            cluster,
            annotation,
            color_profile,
            expression_label,
            deliver_emails,
            cluster_point_size,
            cluster_point_alpha,
            cluster_point_border,
        } = other;

        self.cluster = cluster.or(self.cluster.take());
        self.annotation = annotation.or(self.annotation.take());
        self.color_profile = color_profile.or(self.color_profile.take());
        self.expression_label = expression_label.or(self.expression_label.take());
        self.deliver_emails = deliver_emails.or(self.deliver_emails);
        self.cluster_point_size = cluster_point_size.or(self.cluster_point_size);
        self.cluster_point_alpha = cluster_point_alpha.or(self.cluster_point_alpha);
        self.cluster_point_border = cluster_point_border.or(self.cluster_point_border);
    }
}

/// The requesting user, as far as permission checks are concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub id: Uuid,
    pub name: String,
    pub url_safe_name: String,
    #[serde(default)]
    pub accession: Option<String>,
    #[serde(default)]
    pub description: String,
    pub public: bool,
    #[serde(default)]
    pub embargo: Option<NaiveDate>,
    #[serde(default)]
    pub cell_count: u64,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub view_order: i64,
    pub user_id: Uuid,
    #[serde(default)]
    pub shares: Vec<StudyShare>,
    #[serde(default)]
    pub default_options: DefaultOptions,
    #[serde(default)]
    pub initialized: bool,
    pub created_at: DateTime<Utc>,
}

impl Endpoint for Study {
    fn endpoint() -> String {
        format!("{ENDPOINT}/{{study_name}}")
    }
}

/// Lowercases and replaces every run of non-alphanumerics with a single dash.
#[must_use]
pub fn url_safe_name(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

impl Study {
    #[must_use]
    pub fn new(new_study: NewStudy, user_id: Uuid, now: DateTime<Utc>) -> Self {
        let NewStudy {
            name,
            description,
            public,
            embargo,
            cell_count,
            default_options,
        } = new_study;

        Self {
            id: Uuid::now_v7(),
            url_safe_name: url_safe_name(&name),
            name,
            accession: None,
            description: description.unwrap_or_default(),
            public,
            embargo,
            cell_count: cell_count.unwrap_or_default(),
            view_count: 0,
            view_order: 100,
            user_id,
            shares: Vec::new(),
            default_options,
            initialized: false,
            created_at: now,
        }
    }

    fn share_for(&self, viewer: &Viewer) -> Option<SharePermission> {
        self.shares
            .iter()
            .find(|s| s.email.eq_ignore_ascii_case(&viewer.email))
            .map(|s| s.permission)
    }

    #[must_use]
    pub fn is_owner(&self, viewer: &Viewer) -> bool {
        self.user_id == viewer.id
    }

    #[must_use]
    pub fn can_view(&self, viewer: Option<&Viewer>) -> bool {
        if self.public {
            return true;
        }

        viewer.is_some_and(|v| self.is_owner(v) || self.share_for(v).is_some())
    }

    #[must_use]
    pub fn can_edit(&self, viewer: Option<&Viewer>) -> bool {
        viewer.is_some_and(|v| {
            self.is_owner(v) || self.share_for(v) == Some(SharePermission::Edit)
        })
    }

    /// Downloads are blocked until the embargo date for everyone who cannot edit.
    #[must_use]
    pub fn embargoed(&self, viewer: Option<&Viewer>, today: NaiveDate) -> bool {
        self.embargo.is_some_and(|date| today < date) && !self.can_edit(viewer)
    }

    #[must_use]
    pub fn default_annotation(&self) -> Option<&str> {
        self.default_options.annotation.as_deref()
    }

    #[must_use]
    pub fn default_cluster(&self) -> Option<&str> {
        self.default_options.cluster.as_deref()
    }

    #[must_use]
    pub fn default_color_profile(&self) -> Option<&str> {
        self.default_options.color_profile.as_deref()
    }

    /// Whether a numeric default annotation with a custom color profile applies to `selector`.
    #[must_use]
    pub fn custom_colorscale_for(&self, selector: &str) -> Option<&str> {
        let annotation = self.default_annotation()?;
        let is_numeric = annotation.split("--").nth(1) == Some("numeric");

        (annotation == selector && is_numeric)
            .then(|| self.default_color_profile())
            .flatten()
    }

    #[must_use]
    pub fn plot_style(&self) -> PlotStyle {
        let DefaultOptions {
            expression_label,
            cluster_point_size,
            cluster_point_border,
            ..
        } = &self.default_options;

        PlotStyle {
            point_size: cluster_point_size.unwrap_or(DEFAULT_POINT_SIZE),
            show_borders: cluster_point_border.unwrap_or(true),
            expression_label: expression_label
                .clone()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_EXPRESSION_LABEL.to_string()),
        }
    }

    /// Applies a settings update and reports which derived data must be refreshed.
    pub fn apply_settings(&mut self, settings: StudySettings) -> SettingsChange {
        let StudySettings {
            name,
            description,
            public,
            embargo,
            cell_count,
            default_options,
            study_shares,
        } = settings;

        let mut change = SettingsChange::default();

        if let Some(name) = name.filter(|n| *n != self.name) {
            change.previous_url_safe_name = Some(self.url_safe_name.clone());
            self.url_safe_name = url_safe_name(&name);
            self.name = name;
        }

        if let Some(description) = description {
            self.description = description;
        }

        if let Some(public) = public {
            self.public = public;
        }

        if let Some(embargo) = embargo {
            self.embargo = embargo;
        }

        if let Some(cell_count) = cell_count {
            self.cell_count = cell_count;
        }

        if let Some(options) = default_options {
            let before = self.default_options.clone();
            self.default_options.merge(options);
            change.default_options_changed = before != self.default_options;
        }

        for share in study_shares.unwrap_or_default() {
            let ShareUpdate {
                email,
                permission,
                destroy,
            } = share;

            self.shares.retain(|s| !s.email.eq_ignore_ascii_case(&email));
            if !destroy {
                self.shares.push(StudyShare { email, permission });
            }
        }

        change
    }
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct SettingsChange {
    pub previous_url_safe_name: Option<String>,
    pub default_options_changed: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[garde(allow_unvalidated)]
pub struct NewStudy {
    #[garde(length(min = 1), custom(has_alphanumeric))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_public")]
    pub public: bool,
    #[serde(default)]
    pub embargo: Option<NaiveDate>,
    #[serde(default)]
    pub cell_count: Option<u64>,
    #[serde(default)]
    #[garde(dive)]
    pub default_options: DefaultOptions,
}

fn default_public() -> bool {
    true
}

fn has_alphanumeric(name: &str, _: &()) -> garde::Result {
    if url_safe_name(name).is_empty() {
        return Err(garde::Error::new("name must contain a letter or digit"));
    }

    Ok(())
}

impl Endpoint for NewStudy {
    fn endpoint() -> String {
        ENDPOINT.to_string()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[garde(allow_unvalidated)]
pub struct ShareUpdate {
    #[garde(email)]
    pub email: String,
    pub permission: SharePermission,
    #[serde(default, rename = "_destroy")]
    pub destroy: bool,
}

/// The subset of study fields editable from the settings tab.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
#[garde(allow_unvalidated)]
pub struct StudySettings {
    #[garde(length(min = 1))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub public: Option<bool>,
    pub embargo: Option<Option<NaiveDate>>,
    pub cell_count: Option<u64>,
    #[garde(dive)]
    pub default_options: Option<DefaultOptions>,
    #[garde(dive)]
    pub study_shares: Option<Vec<ShareUpdate>>,
}

impl Endpoint for StudySettings {
    fn endpoint() -> String {
        format!("{ENDPOINT}/{{study_name}}/settings")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, valuable::Valuable)]
#[serde(rename_all = "snake_case")]
pub enum StudyOrder {
    Recent,
    Popular,
    #[default]
    Default,
}

impl StudyOrder {
    pub fn sort(&self, studies: &mut [Study]) {
        match self {
            Self::Recent => studies.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            Self::Popular => studies.sort_by(|a, b| b.view_count.cmp(&a.view_count)),
            Self::Default => studies.sort_by(|a, b| {
                a.view_order.cmp(&b.view_order).then_with(|| a.name.cmp(&b.name))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn study(public: bool) -> Study {
        let new_study = NewStudy {
            name: "Mouse Brain: 10x".to_string(),
            description: None,
            public,
            embargo: NaiveDate::from_ymd_opt(2030, 1, 1),
            cell_count: None,
            default_options: DefaultOptions::default(),
        };

        Study::new(new_study, Uuid::nil(), Utc::now())
    }

    fn viewer(email: &str) -> Viewer {
        Viewer {
            id: Uuid::now_v7(),
            email: email.to_string(),
        }
    }

    #[rstest]
    #[case("Mouse Brain: 10x", "mouse-brain-10x")]
    #[case("  leading and trailing!! ", "leading-and-trailing")]
    #[case("Multiple   Spaces", "multiple-spaces")]
    fn slugs(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(url_safe_name(name), expected);
    }

    #[test]
    fn private_study_permissions() {
        let mut study = study(false);
        let owner = Viewer {
            id: study.user_id,
            email: "owner@example.com".to_string(),
        };
        let reader = viewer("reader@example.com");
        let editor = viewer("Editor@Example.com");
        let stranger = viewer("stranger@example.com");

        study.shares = vec![
            StudyShare {
                email: "reader@example.com".to_string(),
                permission: SharePermission::View,
            },
            StudyShare {
                email: "editor@example.com".to_string(),
                permission: SharePermission::Edit,
            },
        ];

        assert!(!study.can_view(None));
        assert!(study.can_view(Some(&owner)));
        assert!(study.can_view(Some(&reader)));
        assert!(!study.can_view(Some(&stranger)));

        assert!(study.can_edit(Some(&owner)));
        assert!(study.can_edit(Some(&editor)));
        assert!(!study.can_edit(Some(&reader)));

        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert!(study.embargoed(Some(&reader), today));
        assert!(!study.embargoed(Some(&editor), today));
        assert!(!study.embargoed(Some(&reader), NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()));
    }

    #[test]
    fn settings_rename_and_options() {
        let mut study = study(true);
        let settings: StudySettings = serde_json::from_value(serde_json::json!({
            "name": "Human Retina",
            "default_options": {"cluster_point_size": 5.0},
            "study_shares": [
                {"email": "a@example.com", "permission": "view"},
                {"email": "b@example.com", "permission": "edit", "_destroy": true}
            ]
        }))
        .unwrap();
        settings.validate().unwrap();

        let change = study.apply_settings(settings);

        assert_eq!(
            change,
            SettingsChange {
                previous_url_safe_name: Some("mouse-brain-10x".to_string()),
                default_options_changed: true,
            }
        );
        assert_eq!(study.url_safe_name, "human-retina");
        assert_eq!(study.plot_style().point_size, 5.0);
        assert_eq!(study.shares.len(), 1);
    }

    #[test]
    fn settings_reject_unknown_colorscale() {
        let settings: StudySettings = serde_json::from_value(serde_json::json!({
            "default_options": {"color_profile": "Sparkles"}
        }))
        .unwrap();

        assert!(settings.validate().is_err());
    }

    #[test]
    fn custom_colorscale_only_for_numeric_default() {
        let mut study = study(true);
        study.default_options.annotation = Some("Age--numeric--study".to_string());
        study.default_options.color_profile = Some("Viridis".to_string());

        assert_eq!(study.custom_colorscale_for("Age--numeric--study"), Some("Viridis"));
        assert_eq!(study.custom_colorscale_for("Cluster--group--cluster"), None);

        study.default_options.annotation = Some("Cluster--group--cluster".to_string());
        assert_eq!(study.custom_colorscale_for("Cluster--group--cluster"), None);
    }
}
