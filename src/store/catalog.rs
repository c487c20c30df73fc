//! Category/prompt catalog - read-mostly reference data seeded from JSON

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Broad content grouping for categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    Movies,
    Actors,
    TvShows,
    Anime,
    Sports,
    Celebrities,
    VideoGames,
    General,
}

impl Default for Genre {
    fn default() -> Self {
        Self::General
    }
}

/// Category-level difficulty label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::Medium
    }
}

/// Where a prompt's picture comes from. An uploaded asset always wins over
/// an external link when both sources are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRef {
    /// File uploaded through the content admin, served under /media
    Asset { path: String },
    /// Plain external URL
    External { url: String },
}

impl ImageRef {
    /// Apply the precedence rule to the two possible sources
    pub fn resolve(asset_path: Option<String>, external_url: Option<String>) -> Option<Self> {
        match (asset_path, external_url) {
            (Some(path), _) if !path.is_empty() => Some(Self::Asset { path }),
            (_, Some(url)) if !url.is_empty() => Some(Self::External { url }),
            _ => None,
        }
    }

    /// URL a client can load the image from
    pub fn display_url(&self) -> String {
        match self {
            Self::Asset { path } => format!("/media/{}", path),
            Self::External { url } => url.clone(),
        }
    }
}

/// A selectable prompt grouping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub name_ar: String,
    pub genre: Genre,
    pub sub_genre: String,
    pub difficulty: Difficulty,
    /// Emoji shown next to the name
    pub icon: String,
    pub is_active: bool,
}

impl Category {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            name_ar: String::new(),
            genre: Genre::General,
            sub_genre: String::new(),
            difficulty: Difficulty::Medium,
            icon: "🎬".to_string(),
            is_active: true,
        }
    }
}

/// One actable title within a category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: Uuid,
    pub category_id: Uuid,
    pub title: String,
    pub title_ar: String,
    pub image: Option<ImageRef>,
    /// 1-5 difficulty scale
    pub difficulty: u8,
    /// Global usage counter across all games, never reset
    pub times_used: u32,
    pub is_active: bool,
    /// Extra info such as year or cast
    pub metadata: Map<String, Value>,
}

impl Prompt {
    pub fn new(category_id: Uuid, title: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            category_id,
            title: title.to_string(),
            title_ar: String::new(),
            image: None,
            difficulty: 3,
            times_used: 0,
            is_active: true,
            metadata: Map::new(),
        }
    }
}

/// In-process catalog of categories and prompts. Seeded once at startup
/// from a JSON file; mutated only through the usage counter afterwards.
pub struct CatalogStore {
    inner: RwLock<CatalogData>,
}

#[derive(Default)]
struct CatalogData {
    categories: HashMap<Uuid, Category>,
    prompts: HashMap<Uuid, Prompt>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CatalogData::default()),
        }
    }

    /// Load a JSON seed file. Returns (categories, prompts) loaded.
    pub fn load_file(&self, path: &str) -> Result<(usize, usize), CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        self.load_json(&raw)
    }

    /// Parse and install a JSON seed document
    pub fn load_json(&self, raw: &str) -> Result<(usize, usize), CatalogError> {
        let seed: CatalogSeed = serde_json::from_str(raw)?;
        let mut data = self.inner.write();

        let mut prompt_count = 0;
        let category_count = seed.categories.len();

        for cat in seed.categories {
            let category_id = cat.id;
            data.categories.insert(
                category_id,
                Category {
                    id: category_id,
                    name: cat.name,
                    name_ar: cat.name_ar,
                    genre: cat.genre,
                    sub_genre: cat.sub_genre,
                    difficulty: cat.difficulty,
                    icon: cat.icon,
                    is_active: cat.is_active,
                },
            );

            for p in cat.prompts {
                prompt_count += 1;
                data.prompts.insert(
                    p.id,
                    Prompt {
                        id: p.id,
                        category_id,
                        title: p.title,
                        title_ar: p.title_ar,
                        image: ImageRef::resolve(p.image_asset, p.image_url),
                        difficulty: p.difficulty,
                        times_used: 0,
                        is_active: p.is_active,
                        metadata: p.metadata,
                    },
                );
            }
        }

        Ok((category_count, prompt_count))
    }

    pub fn insert_category(&self, category: Category) {
        self.inner.write().categories.insert(category.id, category);
    }

    pub fn insert_prompt(&self, prompt: Prompt) {
        self.inner.write().prompts.insert(prompt.id, prompt);
    }

    pub fn category(&self, id: Uuid) -> Option<Category> {
        self.inner.read().categories.get(&id).cloned()
    }

    pub fn prompt(&self, id: Uuid) -> Option<Prompt> {
        self.inner.read().prompts.get(&id).cloned()
    }

    /// Active categories sorted by (genre, name), the catalog display order
    pub fn active_categories(&self) -> Vec<Category> {
        let data = self.inner.read();
        let mut categories: Vec<Category> = data
            .categories
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.genre.cmp(&b.genre).then_with(|| a.name.cmp(&b.name)));
        categories
    }

    /// Number of active prompts under a category
    pub fn active_prompt_count(&self, category_id: Uuid) -> usize {
        self.inner
            .read()
            .prompts
            .values()
            .filter(|p| p.category_id == category_id && p.is_active)
            .count()
    }

    /// Ids of every active prompt in a category
    pub fn active_prompt_ids(&self, category_id: Uuid) -> Vec<Uuid> {
        self.inner
            .read()
            .prompts
            .values()
            .filter(|p| p.category_id == category_id && p.is_active)
            .map(|p| p.id)
            .collect()
    }

    /// Bump the global usage counter after a prompt is bound to a round
    pub fn record_usage(&self, prompt_id: Uuid) {
        if let Some(prompt) = self.inner.write().prompts.get_mut(&prompt_id) {
            prompt.times_used += 1;
        }
    }
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Catalog seed file errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog file: {0}")]
    Parse(#[from] serde_json::Error),
}

// --- Seed file shapes -------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CatalogSeed {
    categories: Vec<CategorySeed>,
}

#[derive(Debug, Deserialize)]
struct CategorySeed {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,
    name: String,
    #[serde(default)]
    name_ar: String,
    #[serde(default)]
    genre: Genre,
    #[serde(default)]
    sub_genre: String,
    #[serde(default)]
    difficulty: Difficulty,
    #[serde(default = "default_icon")]
    icon: String,
    #[serde(default = "default_true")]
    is_active: bool,
    #[serde(default)]
    prompts: Vec<PromptSeed>,
}

#[derive(Debug, Deserialize)]
struct PromptSeed {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,
    title: String,
    #[serde(default)]
    title_ar: String,
    #[serde(default)]
    image_asset: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default = "default_prompt_difficulty")]
    difficulty: u8,
    #[serde(default = "default_true")]
    is_active: bool,
    #[serde(default)]
    metadata: Map<String, Value>,
}

fn default_icon() -> String {
    "🎬".to_string()
}

fn default_true() -> bool {
    true
}

fn default_prompt_difficulty() -> u8 {
    3
}
