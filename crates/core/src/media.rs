//! Media kinds, quality hints, and the static fallback tables.
//!
//! Every media asset the pipeline touches belongs to exactly one kind, and
//! each kind has a fixed, ordered chain of alternative sources tried after
//! the primary fails. The chains and placeholder paths are static data;
//! an unhandled kind is a compile error, not a runtime default.

use url::Url;

/// Host suffix of the remote media service that serves derived variants
pub const REMOTE_MEDIA_HOST: &str = "aulacdn.net";

/// File extensions recognized as media assets
const MEDIA_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "webp", "svg", "avif"];

/// Coarse instruction to the remote media service about variant size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityHint {
    /// Smallest available variant
    Low,
    /// Mid-size variant
    Medium,
    /// Let the media service decide
    Auto,
}

impl QualityHint {
    /// The `quality` query value this hint maps to, if any
    pub fn as_param(&self) -> Option<&'static str> {
        match self {
            QualityHint::Low => Some("low"),
            QualityHint::Medium => Some("medium"),
            QualityHint::Auto => None,
        }
    }

    /// Apply this hint to a URL, replacing any previous `quality` value.
    ///
    /// URLs outside the remote media service are returned unchanged.
    pub fn apply(&self, url: &Url) -> Url {
        if !is_remote_media_host(url) {
            return url.clone();
        }

        let mut adjusted = url.clone();
        let retained: Vec<(String, String)> = adjusted
            .query_pairs()
            .filter(|(k, _)| k != "quality")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        adjusted.set_query(None);
        {
            let mut pairs = adjusted.query_pairs_mut();
            for (k, v) in &retained {
                pairs.append_pair(k, v);
            }
            if let Some(value) = self.as_param() {
                pairs.append_pair("quality", value);
            }
        }
        if adjusted.query() == Some("") {
            adjusted.set_query(None);
        }
        adjusted
    }
}

/// Kinds of media the learning client renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Course cover imagery
    Course,
    /// User avatars
    User,
    /// Video thumbnails
    Video,
}

/// Course categories with dedicated placeholder art
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CourseCategory {
    Programming,
    Design,
    Business,
    Science,
}

/// Position of a candidate inside a fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStage {
    /// The originally requested variant
    Primary,
    /// A forced low-quality variant of the same asset
    Degraded,
    /// The kind- or category-specific placeholder
    KindPlaceholder,
    /// The generic placeholder, last resort
    GenericPlaceholder,
}

/// One alternative source inside a fallback chain
#[derive(Debug, Clone)]
pub struct FallbackCandidate {
    pub url: Url,
    pub stage: FallbackStage,
}

/// The ordered list of alternative sources for one media asset.
///
/// Immutable once built: primary variant, degraded variant, kind/category
/// placeholder, generic placeholder.
#[derive(Debug, Clone)]
pub struct FallbackChain {
    candidates: Vec<FallbackCandidate>,
}

impl FallbackChain {
    /// Build the chain for a resource of the given kind.
    ///
    /// `app_origin` anchors the placeholder paths, which are app-local
    /// assets. The degraded stage is skipped for assets the media service
    /// cannot derive variants of.
    pub fn resolve(
        kind: MediaKind,
        resource: &Url,
        category: Option<CourseCategory>,
        app_origin: &Url,
    ) -> Self {
        let mut candidates = vec![FallbackCandidate {
            url: resource.clone(),
            stage: FallbackStage::Primary,
        }];

        if is_remote_media_host(resource) {
            candidates.push(FallbackCandidate {
                url: QualityHint::Low.apply(resource),
                stage: FallbackStage::Degraded,
            });
        }

        if let Some(url) = placeholder_url(app_origin, kind, category) {
            candidates.push(FallbackCandidate {
                url,
                stage: FallbackStage::KindPlaceholder,
            });
        }

        if let Some(url) = generic_placeholder_url(app_origin) {
            candidates.push(FallbackCandidate {
                url,
                stage: FallbackStage::GenericPlaceholder,
            });
        }

        Self { candidates }
    }

    pub fn candidates(&self) -> &[FallbackCandidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, stage_index: usize) -> Option<&FallbackCandidate> {
        self.candidates.get(stage_index)
    }
}

/// App-local path of the placeholder for a kind (and course category)
pub fn placeholder_path(kind: MediaKind, category: Option<CourseCategory>) -> &'static str {
    match kind {
        MediaKind::Course => match category {
            Some(CourseCategory::Programming) => "/assets/placeholders/course-programming.svg",
            Some(CourseCategory::Design) => "/assets/placeholders/course-design.svg",
            Some(CourseCategory::Business) => "/assets/placeholders/course-business.svg",
            Some(CourseCategory::Science) => "/assets/placeholders/course-science.svg",
            None => "/assets/placeholders/course.svg",
        },
        MediaKind::User => "/assets/placeholders/user.svg",
        MediaKind::Video => "/assets/placeholders/video.svg",
    }
}

/// App-local path of the last-resort placeholder
pub const GENERIC_PLACEHOLDER_PATH: &str = "/assets/placeholders/generic.svg";

fn placeholder_url(
    app_origin: &Url,
    kind: MediaKind,
    category: Option<CourseCategory>,
) -> Option<Url> {
    app_origin.join(placeholder_path(kind, category)).ok()
}

fn generic_placeholder_url(app_origin: &Url) -> Option<Url> {
    app_origin.join(GENERIC_PLACEHOLDER_PATH).ok()
}

/// Whether a URL points at the remote media service
pub fn is_remote_media_host(url: &Url) -> bool {
    url.host_str()
        .map(|host| host == REMOTE_MEDIA_HOST || host.ends_with(&format!(".{}", REMOTE_MEDIA_HOST)))
        .unwrap_or(false)
}

/// Whether a URL names a media asset, by extension or by media host
pub fn is_media_asset(url: &Url) -> bool {
    if is_remote_media_host(url) {
        return true;
    }

    url.path()
        .rsplit('.')
        .next()
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Classify a media URL into a kind by its path shape.
///
/// Returns `None` for media paths the client has no kind mapping for;
/// those still route through the image handler with generic fallback.
pub fn kind_for_url(url: &Url) -> Option<MediaKind> {
    let path = url.path();
    if path.contains("/covers/") {
        Some(MediaKind::Course)
    } else if path.contains("/avatars/") {
        Some(MediaKind::User)
    } else if path.contains("/thumbnails/") {
        Some(MediaKind::Video)
    } else {
        None
    }
}
