//! Catalog entities: the canonical game catalog (keyed by class identifier)
//! and the user-facing catalog derived from it (keyed by generated ids).

use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

use crate::normalization::value::{
    coerce_bool, coerce_color, coerce_f64, coerce_form, coerce_i64, coerce_opt_f64, coerce_string,
};

/// First present, non-null field among the spellings the documents use.
fn field<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find(|v| !v.is_null())
}

fn required_name(class_name: &str, record: &Value) -> Result<String> {
    coerce_string(record.get("name")).ok_or_else(|| anyhow!("{class_name}: record has no name"))
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct GameItem {
    pub class_name: String,
    pub name: String,
    pub description: Option<String>,
    pub stack_size: i64,
    pub energy: f64,
    pub radioactive: f64,
    pub can_be_discarded: bool,
    pub sink_points: i64,
    pub abbreviation: Option<String>,
    pub form: String,
    pub fluid_color: Option<String>,
    pub experimental: bool,
    pub stable: bool,
}

impl GameItem {
    pub fn from_record(class_name: &str, record: &Value) -> Result<Self> {
        // Older dumps only carry a `liquid` flag instead of `form`.
        let form = match field(record, &["form"]) {
            Some(v) => coerce_form(Some(v)),
            None if coerce_bool(record.get("liquid"), false) => "liquid".to_string(),
            None => "solid".to_string(),
        };
        Ok(Self {
            class_name: class_name.to_string(),
            name: required_name(class_name, record)?,
            description: coerce_string(record.get("description")),
            stack_size: coerce_i64(field(record, &["stackSize", "stack_size"]), 0),
            energy: coerce_f64(field(record, &["energy", "energyValue"]), 0.0),
            radioactive: coerce_f64(field(record, &["radioactive", "radioactiveDecay"]), 0.0),
            can_be_discarded: coerce_bool(field(record, &["canBeDiscarded"]), true),
            sink_points: coerce_i64(field(record, &["sinkPoints", "resourceSinkPoints"]), 0),
            abbreviation: coerce_string(record.get("abbreviation")),
            form,
            fluid_color: coerce_color(field(record, &["fluidColor", "fluid_color"])),
            experimental: coerce_bool(record.get("experimental"), false),
            stable: coerce_bool(record.get("stable"), true),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct GameBuilding {
    pub class_name: String,
    pub name: String,
    pub description: Option<String>,
    pub unlocked_by: Option<String>,
    pub power_usage: f64,
    pub power_generated: f64,
    pub supplemental_load_rate: f64,
    pub overclockable: bool,
    pub somersloop_slots: i64,
    pub is_vehicle: bool,
    pub experimental: bool,
    pub stable: bool,
}

impl GameBuilding {
    pub fn from_record(class_name: &str, record: &Value) -> Result<Self> {
        Ok(Self {
            class_name: class_name.to_string(),
            name: required_name(class_name, record)?,
            description: coerce_string(record.get("description")),
            unlocked_by: coerce_string(field(record, &["unlockedBy", "unlocked_by"])),
            power_usage: coerce_f64(field(record, &["powerUsage", "powerConsumption"]), 0.0),
            power_generated: coerce_f64(field(record, &["powerGenerated", "powerGeneration"]), 0.0),
            supplemental_load_rate: coerce_f64(
                field(record, &["supplementalLoadRate", "fuelSupplementRate"]),
                0.0,
            ),
            overclockable: coerce_bool(field(record, &["overclockable", "canOverclock"]), false),
            somersloop_slots: coerce_i64(field(record, &["somersloopSlots", "productionShardSlots"]), 0),
            is_vehicle: coerce_bool(field(record, &["isVehicle", "vehicle"]), false),
            experimental: coerce_bool(record.get("experimental"), false),
            stable: coerce_bool(record.get("stable"), true),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct GameRecipe {
    pub class_name: String,
    pub name: String,
    pub unlocked_by: Option<String>,
    pub duration: f64,
    pub alternate: bool,
    pub in_craft_bench: bool,
    pub in_workshop: bool,
    pub in_build_gun: bool,
    pub in_customizer: bool,
    pub manual_crafting_multiplier: f64,
    pub min_power: Option<f64>,
    pub max_power: Option<f64>,
    pub experimental: bool,
    pub stable: bool,
}

/// One ingredient or product reference as it appears in the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeLine {
    pub item_class: String,
    pub amount: f64,
}

/// A parsed recipe record: the scalar row plus its unresolved relations.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDraft {
    pub recipe: GameRecipe,
    pub ingredients: Vec<RecipeLine>,
    pub products: Vec<RecipeLine>,
    pub produced_in: Vec<String>,
    /// Lines without an item reference; dropped during parsing.
    pub malformed_lines: usize,
}

impl RecipeDraft {
    pub fn from_record(class_name: &str, record: &Value) -> Result<Self> {
        let recipe = GameRecipe {
            class_name: class_name.to_string(),
            name: required_name(class_name, record)?,
            unlocked_by: coerce_string(field(record, &["unlockedBy", "unlocked_by"])),
            duration: coerce_f64(field(record, &["duration", "time"]), 0.0),
            alternate: coerce_bool(record.get("alternate"), false),
            in_craft_bench: coerce_bool(field(record, &["inCraftBench", "inHand"]), false),
            in_workshop: coerce_bool(record.get("inWorkshop"), false),
            in_build_gun: coerce_bool(field(record, &["inBuildGun", "forBuilding"]), false),
            in_customizer: coerce_bool(record.get("inCustomizer"), false),
            manual_crafting_multiplier: coerce_f64(
                field(record, &["manualCraftingMultiplier", "manualTimeMultiplier"]),
                1.0,
            ),
            min_power: coerce_opt_f64(record.get("minPower")),
            max_power: coerce_opt_f64(record.get("maxPower")),
            experimental: coerce_bool(record.get("experimental"), false),
            stable: coerce_bool(record.get("stable"), true),
        };

        let mut malformed_lines = 0;
        let mut lines = |key: &str| -> Vec<RecipeLine> {
            let Some(Value::Array(raw)) = record.get(key) else {
                return Vec::new();
            };
            raw.iter()
                .filter_map(|line| {
                    let parsed = coerce_string(line.get("item")).map(|item_class| RecipeLine {
                        item_class,
                        amount: coerce_f64(line.get("amount"), 0.0),
                    });
                    if parsed.is_none() {
                        malformed_lines += 1;
                    }
                    parsed
                })
                .collect()
        };
        let ingredients = lines("ingredients");
        let products = lines("products");

        let mut produced_in: Vec<String> = Vec::new();
        if let Some(Value::Array(raw)) = record.get("producedIn") {
            for building in raw.iter().filter_map(|b| coerce_string(Some(b))) {
                if !produced_in.contains(&building) {
                    produced_in.push(building);
                }
            }
        }

        Ok(Self {
            recipe,
            ingredients,
            products,
            produced_in,
            malformed_lines,
        })
    }
}

/// Derived, user-editable item. One per distinct display name.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub game_class_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Building {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub power_usage: f64,
    pub game_class_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub duration: f64,
    pub game_class_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct RecipeItem {
    pub id: String,
    pub recipe_id: String,
    pub item_id: String,
    pub amount: f64,
    pub is_input: bool,
    pub position: i64,
}
