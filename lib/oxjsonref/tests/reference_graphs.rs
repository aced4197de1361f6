//! End-to-end round-trips of object graphs with sharing and cycles.

use oxjsongraph::{JsonArray, JsonNode, JsonObject};
use oxjsonref::{JsonRefParser, JsonRefSerializer, ReferenceHandling};
use std::io::Read;

fn serialize(node: &JsonNode, handling: ReferenceHandling) -> Vec<u8> {
    JsonRefSerializer::new()
        .with_reference_handling(handling)
        .serialize_to_writer(Vec::new(), node)
        .unwrap()
}

fn parse(bytes: &[u8]) -> JsonNode {
    JsonRefParser::new()
        .with_reference_handling(ReferenceHandling::Preserve)
        .parse_slice(bytes)
        .unwrap()
}

/// A company where two teams share a manager and the manager manages themselves.
fn company() -> JsonNode {
    let manager = JsonObject::new();
    manager.insert("Name", "Angela");
    manager.insert("Manager", manager.clone());
    let team_a = JsonObject::new();
    team_a.insert("Lead", manager.clone());
    let team_b = JsonObject::new();
    team_b.insert("Lead", manager);
    let teams = JsonArray::new();
    teams.push(team_a);
    teams.push(team_b);
    let company = JsonObject::new();
    company.insert("Teams", teams);
    company.into()
}

#[test]
fn test_identity_quotient_survives_the_round_trip() {
    let bytes = serialize(&company(), ReferenceHandling::Preserve);
    let root = parse(&bytes);

    let teams = root.as_object().unwrap().get("Teams").unwrap();
    let teams = teams.as_array().unwrap();
    let lead_a = teams.get(0).unwrap().as_object().unwrap().get("Lead").unwrap();
    let lead_b = teams.get(1).unwrap().as_object().unwrap().get("Lead").unwrap();

    // both teams still share one lead
    assert!(lead_a.same(&lead_b));
    // who still manages themselves
    let manager = lead_a.as_object().unwrap().get("Manager").unwrap();
    assert!(manager.same(&lead_a));
    // and the teams stay distinct objects
    assert!(!teams.get(0).unwrap().same(&teams.get(1).unwrap()));
}

#[test]
fn test_round_trip_is_byte_stable() {
    let first = serialize(&company(), ReferenceHandling::Preserve);
    let second = serialize(&parse(&first), ReferenceHandling::Preserve);
    assert_eq!(first, second);
}

#[test]
fn test_ignore_mode_output_reparses() {
    let bytes = serialize(&company(), ReferenceHandling::Ignore);
    // the looping member is absent, the rest is plain JSON
    let root = JsonRefParser::new().parse_slice(&bytes).unwrap();
    let teams = root.as_object().unwrap().get("Teams").unwrap();
    let lead_a = teams
        .as_array()
        .unwrap()
        .get(0)
        .unwrap()
        .as_object()
        .unwrap()
        .get("Lead")
        .unwrap();
    let lead_a = lead_a.as_object().unwrap();
    assert_eq!(lead_a.get("Name").unwrap().as_str(), Some("Angela"));
    assert!(!lead_a.contains_key("Manager"));
}

#[test]
fn test_escaped_metadata_names_are_still_metadata() {
    // property names are unescaped before classification
    let root = parse(br#"{"\u0024id":"1","Self":{"\u0024ref":"1"}}"#);
    let root = root.as_object().unwrap();
    assert!(root.get("Self").unwrap().as_object().unwrap().same(root));
}

/// A reader handing out one byte at a time, to exercise incremental consumption.
struct OneByteAtATime<R: Read>(R);

impl<R: Read> Read for OneByteAtATime<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.0.read(&mut buf[..1])
    }
}

#[test]
fn test_parsing_resumes_across_tiny_reads() {
    let bytes = serialize(&company(), ReferenceHandling::Preserve);
    let root = JsonRefParser::new()
        .with_reference_handling(ReferenceHandling::Preserve)
        .parse_reader(OneByteAtATime(bytes.as_slice()))
        .unwrap();
    let teams = root.as_object().unwrap().get("Teams").unwrap();
    assert_eq!(teams.as_array().unwrap().len(), 2);
}

#[test]
fn test_shared_leaves_are_not_preserved() {
    // leaves are serialized by value each time, sharing applies to composites only
    let root = JsonObject::new();
    root.insert("A", "same text");
    root.insert("B", "same text");
    assert_eq!(
        serialize(&root.into(), ReferenceHandling::Preserve),
        br#"{"$id":"1","A":"same text","B":"same text"}"#
    );
}

#[test]
fn test_number_lexical_forms_survive() {
    let bytes = br#"{"Values":[1,1.0,1e2,-0.5]}"#;
    let root = JsonRefParser::new().parse_slice(bytes).unwrap();
    assert_eq!(
        serialize(&root, ReferenceHandling::Default).as_slice(),
        bytes.as_slice()
    );
}
