//! Recipe rows: DAG instances of jobs and sub-recipes sharing
//! inputs/outputs, plus the node edges that form the graph.

use serde::{Deserialize, Serialize};

/// A recipe instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub recipe_type_id: i64,
    /// True once a newer recipe has replaced this one
    pub is_superseded: bool,
    /// The older recipe this one replaced, if any. Purging a recipe also
    /// purges its predecessor chain.
    pub superseded_recipe_id: Option<i64>,
    pub jobs_total: i32,
    pub jobs_running: i32,
    pub jobs_completed: i32,
}

impl Recipe {
    pub fn new(id: i64, recipe_type_id: i64) -> Self {
        Self {
            id,
            recipe_type_id,
            is_superseded: false,
            superseded_recipe_id: None,
            jobs_total: 0,
            jobs_running: 0,
            jobs_completed: 0,
        }
    }
}

/// The child of a recipe node; exactly one kind by construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeNodeChild {
    Job(i64),
    SubRecipe(i64),
}

/// An edge from a recipe to either a child job or a child sub-recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeNode {
    pub id: i64,
    pub recipe_id: i64,
    pub name: String,
    pub child: RecipeNodeChild,
}

impl RecipeNode {
    pub fn job_node(id: i64, recipe_id: i64, name: impl Into<String>, job_id: i64) -> Self {
        Self {
            id,
            recipe_id,
            name: name.into(),
            child: RecipeNodeChild::Job(job_id),
        }
    }

    pub fn sub_recipe_node(
        id: i64,
        recipe_id: i64,
        name: impl Into<String>,
        sub_recipe_id: i64,
    ) -> Self {
        Self {
            id,
            recipe_id,
            name: name.into(),
            child: RecipeNodeChild::SubRecipe(sub_recipe_id),
        }
    }

    pub fn job_id(&self) -> Option<i64> {
        match self.child {
            RecipeNodeChild::Job(id) => Some(id),
            RecipeNodeChild::SubRecipe(_) => None,
        }
    }

    pub fn sub_recipe_id(&self) -> Option<i64> {
        match self.child {
            RecipeNodeChild::SubRecipe(id) => Some(id),
            RecipeNodeChild::Job(_) => None,
        }
    }
}

/// A dependency edge between two nodes of the same recipe: `node` consumes
/// the output of `depends_on`. A node no other node depends on is a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeNodeLink {
    pub recipe_id: i64,
    pub node: String,
    pub depends_on: String,
}
