use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use roxmltree::{Document, Node};
use tracing::debug;
use typing_engine::{ChallengeContent, TargetContentProvider, TargetId, Vec2};

const SECONDS_PER_CHAR: f64 = 0.45;
const MIN_BASE_SECONDS: f64 = 1.0;
const MIN_TIME_LIMIT_SECONDS: f64 = 0.75;

pub const DEFAULT_TARGETS_XML: &str = r#"<Defs>
    <TargetDef><defName>crow</defName><label>Crow</label><text>crow</text><x>40</x><y>0</y></TargetDef>
    <TargetDef><defName>moth</defName><label>Moth</label><text>lantern</text><x>-70</x><y>30</y></TargetDef>
    <TargetDef><defName>wisp</defName><label>Wisp</label><text>ember</text><x>20</x><y>-120</y><behavior>Reverse</behavior></TargetDef>
    <TargetDef><defName>golem</defName><label>Golem</label><text>granite</text><x>260</x><y>40</y><difficulty>2</difficulty><rewardSeeds>3</rewardSeeds></TargetDef>
</Defs>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDef,
}

#[derive(Debug, Clone)]
pub struct ContentError {
    pub code: ContentErrorCode,
    pub message: String,
    pub source_name: String,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (source={}, line={}, column={})",
                self.code, self.message, self.source_name, loc.line, loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (source={})",
                self.code, self.message, self.source_name
            ),
        }
    }
}

impl std::error::Error for ContentError {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChallengeBehavior {
    #[default]
    Plain,
    Reverse,
}

impl ChallengeBehavior {
    pub fn transform(self, text: &str) -> String {
        match self {
            Self::Plain => text.to_string(),
            Self::Reverse => text.chars().rev().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetDef {
    pub def_name: String,
    pub label: String,
    pub text: String,
    pub position: Vec2,
    pub time_limit_seconds: Option<f64>,
    pub difficulty: u32,
    pub behavior: ChallengeBehavior,
    pub reward_seeds: u32,
}

impl TargetDef {
    pub fn challenge_content(&self) -> ChallengeContent {
        let text = self.behavior.transform(&self.text);
        let time_limit_seconds = self
            .time_limit_seconds
            .unwrap_or_else(|| base_time_for_text(&text, self.difficulty));
        ChallengeContent {
            text,
            time_limit_seconds,
        }
    }
}

/// Time allowed for `text` at `difficulty` when a def gives no explicit limit.
pub fn base_time_for_text(text: &str, difficulty: u32) -> f64 {
    let per_char = SECONDS_PER_CHAR / difficulty.max(1) as f64;
    let base = (text.chars().count() as f64 * per_char).max(MIN_BASE_SECONDS);
    base.max(MIN_TIME_LIMIT_SECONDS)
}

pub fn load_target_defs(path: &Path) -> Result<Vec<TargetDef>, ContentError> {
    let source_name = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|error| ContentError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read content file: {error}"),
        source_name: source_name.clone(),
        location: None,
    })?;
    parse_target_defs(&source_name, &raw)
}

pub fn parse_target_defs(source_name: &str, raw: &str) -> Result<Vec<TargetDef>, ContentError> {
    let doc = Document::parse(raw).map_err(|error| ContentError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        source_name: source_name.to_string(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(error_at_node(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            source_name,
            &doc,
            root,
        ));
    }

    let mut seen_names = HashSet::<String>::new();
    let mut defs = Vec::<TargetDef>::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "TargetDef" {
            return Err(error_at_node(
                ContentErrorCode::UnknownDefType,
                format!(
                    "unsupported def type <{}>; only <TargetDef> is allowed",
                    child.tag_name().name()
                ),
                source_name,
                &doc,
                child,
            ));
        }
        let def = parse_target_def(source_name, &doc, child)?;
        if !seen_names.insert(def.def_name.clone()) {
            return Err(error_at_node(
                ContentErrorCode::DuplicateDef,
                format!("duplicate defName '{}'", def.def_name),
                source_name,
                &doc,
                child,
            ));
        }
        defs.push(def);
    }

    debug!(source = source_name, count = defs.len(), "target_defs_parsed");
    Ok(defs)
}

fn parse_target_def(
    source_name: &str,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<TargetDef, ContentError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut def_name: Option<String> = None;
    let mut label: Option<String> = None;
    let mut text: Option<String> = None;
    let mut x: Option<f32> = None;
    let mut y: Option<f32> = None;
    let mut time_limit_seconds: Option<f64> = None;
    let mut difficulty: Option<u32> = None;
    let mut behavior = ChallengeBehavior::Plain;
    let mut reward_seeds: Option<u32> = None;

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(error_at_node(
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{field_name}> in <TargetDef>"),
                source_name,
                doc,
                field,
            ));
        }

        match field_name.as_str() {
            "defName" => def_name = Some(required_text(source_name, doc, field, "defName")?),
            "label" => label = Some(required_text(source_name, doc, field, "label")?),
            "text" => text = Some(required_text(source_name, doc, field, "text")?),
            "x" => x = Some(parse_coordinate(source_name, doc, field, "x")?),
            "y" => y = Some(parse_coordinate(source_name, doc, field, "y")?),
            "timeLimitSeconds" => {
                let value = required_text(source_name, doc, field, "timeLimitSeconds")?;
                let parsed = value.parse::<f64>().ok().filter(|seconds| {
                    seconds.is_finite() && *seconds > 0.0
                });
                let Some(parsed) = parsed else {
                    return Err(error_at_node(
                        ContentErrorCode::InvalidValue,
                        format!("timeLimitSeconds '{value}' must be a finite number > 0"),
                        source_name,
                        doc,
                        field,
                    ));
                };
                time_limit_seconds = Some(parsed);
            }
            "difficulty" => {
                let value = required_text(source_name, doc, field, "difficulty")?;
                let parsed = value.parse::<u32>().ok().filter(|level| *level >= 1);
                let Some(parsed) = parsed else {
                    return Err(error_at_node(
                        ContentErrorCode::InvalidValue,
                        format!("difficulty '{value}' must be an integer >= 1"),
                        source_name,
                        doc,
                        field,
                    ));
                };
                difficulty = Some(parsed);
            }
            "rewardSeeds" => {
                let value = required_text(source_name, doc, field, "rewardSeeds")?;
                let Ok(parsed) = value.parse::<u32>() else {
                    return Err(error_at_node(
                        ContentErrorCode::InvalidValue,
                        format!("rewardSeeds '{value}' must be a non-negative integer"),
                        source_name,
                        doc,
                        field,
                    ));
                };
                reward_seeds = Some(parsed);
            }
            "behavior" => {
                let value = required_text(source_name, doc, field, "behavior")?;
                behavior = match value.as_str() {
                    "Plain" => ChallengeBehavior::Plain,
                    "Reverse" => ChallengeBehavior::Reverse,
                    _ => {
                        return Err(error_at_node(
                            ContentErrorCode::InvalidValue,
                            format!(
                                "invalid behavior '{value}'; allowed values: Plain, Reverse"
                            ),
                            source_name,
                            doc,
                            field,
                        ))
                    }
                };
            }
            _ => {
                return Err(error_at_node(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{field_name}> in <TargetDef>"),
                    source_name,
                    doc,
                    field,
                ))
            }
        }
    }

    let missing = |field: &str| {
        error_at_node(
            ContentErrorCode::MissingField,
            format!("missing required field <{field}> in <TargetDef>"),
            source_name,
            doc,
            node,
        )
    };
    let def_name = def_name.ok_or_else(|| missing("defName"))?;
    let text = text.ok_or_else(|| missing("text"))?;
    let x = x.ok_or_else(|| missing("x"))?;
    let y = y.ok_or_else(|| missing("y"))?;

    Ok(TargetDef {
        label: label.unwrap_or_else(|| def_name.clone()),
        def_name,
        text,
        position: Vec2::new(x, y),
        time_limit_seconds,
        difficulty: difficulty.unwrap_or(1),
        behavior,
        reward_seeds: reward_seeds.unwrap_or(1),
    })
}

fn parse_coordinate(
    source_name: &str,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<f32, ContentError> {
    let value = required_text(source_name, doc, node, field_name)?;
    match value.parse::<f32>() {
        Ok(parsed) if parsed.is_finite() => Ok(parsed),
        _ => Err(error_at_node(
            ContentErrorCode::InvalidValue,
            format!("{field_name} '{value}' is not a valid finite number"),
            source_name,
            doc,
            node,
        )),
    }
}

fn required_text(
    source_name: &str,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<String, ContentError> {
    let value = node.text().map(str::trim).unwrap_or_default().to_string();
    if value.is_empty() {
        return Err(error_at_node(
            ContentErrorCode::MissingField,
            format!("field <{field_name}> must not be empty"),
            source_name,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn error_at_node(
    code: ContentErrorCode,
    message: String,
    source_name: &str,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> ContentError {
    let pos = doc.text_pos_at(node.range().start);
    ContentError {
        code,
        message,
        source_name: source_name.to_string(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}

/// Serves each target's def as challenge content, both at spawn and on rearm.
#[derive(Debug, Default)]
pub struct DefContentProvider {
    defs_by_target: HashMap<TargetId, TargetDef>,
}

impl DefContentProvider {
    pub fn assign(&mut self, target_id: TargetId, def: TargetDef) {
        self.defs_by_target.insert(target_id, def);
    }
}

impl TargetContentProvider for DefContentProvider {
    fn content_for(&mut self, target_id: TargetId) -> Option<ChallengeContent> {
        self.defs_by_target
            .get(&target_id)
            .map(TargetDef::challenge_content)
    }
}
