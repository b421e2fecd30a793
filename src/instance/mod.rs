//! `InstanceReader`: streams a single filing's XML and materializes the
//! `ContextIndex` and `FactIndex` the `FactProjector` consumes.

pub mod xml;

use std::collections::HashMap;
use std::io::BufRead;

use chrono::NaiveDate;

use crate::errors::InstanceError;
use crate::taxonomy::{Concept, PrimitiveType};
use quick_xml::events::Event;
use quick_xml::Reader;
use xml::{end_eq, parse_attribute, parse_attribute_opt, start_eq};

/// Either a single moment or a span of time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Instant(NaiveDate),
    Duration(NaiveDate, NaiveDate),
}

/// The canonical, sorted (axis, value) tuple of a context. A plain
/// `Vec<(String, String)>` already gets `Ord`/`Hash`/`Eq` from its elements,
/// so it keys a `HashMap` directly once sorted by axis name.
pub type Signature = Vec<(String, String)>;

fn canonicalize(mut pairs: Vec<(String, String)>) -> Signature {
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}

/// A reporting slice: entity, period, and dimensional signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub id: String,
    pub entity_id: String,
    pub period: Period,
    pub signature: Signature,
}

/// A single reported data point.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub concept: String,
    pub context_id: String,
    pub raw_value: String,
    pub data_type: PrimitiveType,
    /// Position in document order; the `FactProjector`'s duplicate-fact
    /// tie-break keeps the highest value seen here.
    pub document_order: usize,
}

pub type ContextIndex = HashMap<String, Context>;
pub type FactIndex = HashMap<Signature, Vec<Fact>>;

/// Non-fatal counters accumulated while reading one filing.
#[derive(Debug, Clone, Default)]
pub struct ReadCounters {
    pub skipped_concepts: usize,
}

/// The result of streaming one filing's XML.
#[derive(Debug, Clone)]
pub struct InstanceDocument {
    pub contexts: ContextIndex,
    pub facts: FactIndex,
    pub entity_id: Option<String>,
    pub counters: ReadCounters,
}

/// Which leaf element inside `xbrli:context` text is currently flowing into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextField {
    Identifier,
    Instant,
    StartDate,
    EndDate,
    Dimension,
}

enum Parsing {
    None,
    Context(PartialContext),
    Fact(PartialFact),
}

struct PartialContext {
    id: String,
    entity_id: Option<String>,
    instant: Option<NaiveDate>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    axes: Vec<(String, String)>,
    field: Option<ContextField>,
    pending_dimension: Option<String>,
}

struct PartialFact {
    concept: String,
    context_id: String,
    data_type: PrimitiveType,
    text: String,
}

fn parse_date(context_id: &str, value: &str) -> Result<NaiveDate, InstanceError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| InstanceError::ContextMalformed(context_id.to_string(), format!("bad date '{value}': {err}")))
}

/// Streams one filing's XML once, building the `ContextIndex` and
/// `FactIndex`. `concepts` is the set of known concepts; elements whose
/// qualified name does not match any concept are ignored and counted.
pub fn read<R: BufRead>(input: R, concepts: &HashMap<String, Concept>) -> Result<InstanceDocument, InstanceError> {
    let mut buf = Vec::new();
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text = true;

    let mut contexts: ContextIndex = HashMap::new();
    let mut pending_facts: Vec<Fact> = Vec::new();
    let mut entity_id: Option<String> = None;
    let mut counters = ReadCounters::default();
    let mut state = Parsing::None;
    let mut order = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,

            Event::Start(event) => {
                let name = xml::qname_string(&event);

                match &mut state {
                    Parsing::None => {
                        if start_eq(&event, "xbrli:context") {
                            let id = parse_attribute(&reader, &event, "id")
                                .map_err(|_| InstanceError::ContextMalformed("<unknown>".into(), "missing id".into()))?;
                            state = Parsing::Context(PartialContext {
                                id,
                                entity_id: None,
                                instant: None,
                                start_date: None,
                                end_date: None,
                                axes: Vec::new(),
                                field: None,
                                pending_dimension: None,
                            });
                        }
                        else if let Some(concept) = concepts.get(&name) {
                            let context_id = parse_attribute(&reader, &event, "contextRef")
                                .map_err(|_| InstanceError::FactParse(name.clone(), "fact is missing contextRef".into()))?;
                            state = Parsing::Fact(PartialFact {
                                concept: name,
                                context_id,
                                data_type: concept.data_type,
                                text: String::new(),
                            });
                        }
                        else {
                            counters.skipped_concepts += 1;
                        }
                    }

                    Parsing::Context(ctx) => {
                        if start_eq(&event, "xbrli:identifier") {
                            ctx.field = Some(ContextField::Identifier);
                        }
                        else if start_eq(&event, "xbrli:instant") {
                            ctx.field = Some(ContextField::Instant);
                        }
                        else if start_eq(&event, "xbrli:startDate") {
                            ctx.field = Some(ContextField::StartDate);
                        }
                        else if start_eq(&event, "xbrli:endDate") {
                            ctx.field = Some(ContextField::EndDate);
                        }
                        else if start_eq(&event, "xbrldi:explicitMember") || start_eq(&event, "xbrldi:typedMember") {
                            let dimension = parse_attribute(&reader, &event, "dimension").map_err(|_| {
                                InstanceError::ContextMalformed(ctx.id.clone(), "dimension member missing dimension attribute".into())
                            })?;
                            ctx.pending_dimension = Some(dimension);
                            ctx.field = Some(ContextField::Dimension);
                        }
                        // xbrli:entity, xbrli:period, xbrli:segment, xbrli:scenario
                        // carry no text of their own; their children pass through
                        // this same loop.
                    }

                    Parsing::Fact(_) => {
                        // Facts are simple elements; nested markup inside a
                        // fact value is not part of the model consumed here.
                    }
                }
            }

            Event::Text(text) => {
                let decoded = text.unescape()?.into_owned();
                let trimmed = decoded.trim();
                if trimmed.is_empty() {
                    buf.clear();
                    continue;
                }

                match &mut state {
                    Parsing::Fact(fact) => fact.text.push_str(trimmed),
                    Parsing::Context(ctx) => match ctx.field {
                        Some(ContextField::Identifier) => ctx.entity_id = Some(trimmed.to_string()),
                        Some(ContextField::Instant) => ctx.instant = Some(parse_date(&ctx.id, trimmed)?),
                        Some(ContextField::StartDate) => ctx.start_date = Some(parse_date(&ctx.id, trimmed)?),
                        Some(ContextField::EndDate) => ctx.end_date = Some(parse_date(&ctx.id, trimmed)?),
                        Some(ContextField::Dimension) => {
                            if let Some(dimension) = ctx.pending_dimension.clone() {
                                ctx.axes.push((dimension, trimmed.to_string()));
                            }
                        }
                        None => {}
                    },
                    Parsing::None => {}
                }
            }

            Event::Empty(event) => {
                if let Parsing::Context(ctx) = &mut state {
                    if start_eq(&event, "xbrldi:explicitMember") || start_eq(&event, "xbrldi:typedMember") {
                        let dimension = parse_attribute(&reader, &event, "dimension").map_err(|_| {
                            InstanceError::ContextMalformed(ctx.id.clone(), "dimension member missing dimension attribute".into())
                        })?;
                        if let Some(value) = parse_attribute_opt(&reader, &event, "value")? {
                            ctx.axes.push((dimension, value));
                        }
                    }
                }
            }

            Event::End(event) => match &mut state {
                Parsing::Context(ctx) if end_eq(&event, "xbrli:context") => {
                    let entity = ctx.entity_id.take().ok_or_else(|| {
                        InstanceError::ContextMalformed(ctx.id.clone(), "missing entity identifier".into())
                    })?;

                    let period = match (ctx.instant, ctx.start_date, ctx.end_date) {
                        (Some(instant), None, None) => Period::Instant(instant),
                        (None, Some(start), Some(end)) if start <= end => Period::Duration(start, end),
                        (None, Some(start), Some(end)) => {
                            return Err(InstanceError::ContextMalformed(
                                ctx.id.clone(),
                                format!("start date {start} is after end date {end}"),
                            ));
                        }
                        _ => {
                            return Err(InstanceError::ContextMalformed(ctx.id.clone(), "missing or ambiguous period".into()));
                        }
                    };

                    let signature = canonicalize(ctx.axes.clone());
                    if entity_id.is_none() {
                        entity_id = Some(entity.clone());
                    }

                    contexts.insert(
                        ctx.id.clone(),
                        Context {
                            id: ctx.id.clone(),
                            entity_id: entity,
                            period,
                            signature,
                        },
                    );
                    state = Parsing::None;
                }

                Parsing::Context(ctx)
                    if end_eq(&event, "xbrli:identifier")
                        || end_eq(&event, "xbrli:instant")
                        || end_eq(&event, "xbrli:startDate")
                        || end_eq(&event, "xbrli:endDate")
                        || end_eq(&event, "xbrldi:explicitMember")
                        || end_eq(&event, "xbrldi:typedMember") =>
                {
                    ctx.field = None;
                    ctx.pending_dimension = None;
                }

                Parsing::Fact(fact) if end_eq(&event, fact.concept.as_str()) => {
                    let PartialFact {
                        concept,
                        context_id,
                        data_type,
                        text,
                    } = std::mem::replace(
                        fact,
                        PartialFact {
                            concept: String::new(),
                            context_id: String::new(),
                            data_type: PrimitiveType::String,
                            text: String::new(),
                        },
                    );

                    pending_facts.push(Fact {
                        concept,
                        context_id,
                        raw_value: text,
                        data_type,
                        document_order: order,
                    });
                    order += 1;
                    state = Parsing::None;
                }

                _ => {}
            },

            _ => {}
        }

        buf.clear();
    }

    // Facts are keyed by the canonical signature of the context they
    // reference, not by the context id itself.
    let mut facts: FactIndex = HashMap::new();
    for fact in pending_facts {
        let signature = match contexts.get(&fact.context_id) {
            Some(ctx) => ctx.signature.clone(),
            None => {
                return Err(InstanceError::FactParse(
                    fact.concept.clone(),
                    format!("references unknown context '{}'", fact.context_id),
                ));
            }
        };
        facts.entry(signature).or_default().push(fact);
    }

    Ok(InstanceDocument {
        contexts,
        facts,
        entity_id,
        counters,
    })
}
