use meridian_models::common::{
    CodeSystem, CodeSystemContentMode, StructureDefinition, StructureDefinitionKind,
    TypeDerivationRule, ValueSet,
};
use serde_json::json;

#[test]
fn parse_value_set_example() {
    let vs: ValueSet = serde_json::from_value(json!({
        "resourceType": "ValueSet",
        "url": "http://hl7.org/fhir/ValueSet/example-extensional",
        "status": "active",
        "compose": {
            "include": [{
                "system": "http://hl7.org/fhir/example",
                "concept": [
                    {"code": "a"},
                    {"code": "b"},
                    {"code": "c"},
                    {"code": "d"}
                ]
            }]
        },
        "text": {"status": "generated", "div": "<div/>"}
    }))
    .unwrap();

    assert_eq!(vs.resource_type, "ValueSet");
    assert_eq!(vs.url, "http://hl7.org/fhir/ValueSet/example-extensional");

    let compose = vs.compose.expect("compose should be present");
    assert_eq!(compose.include.len(), 1);

    let concepts = compose.include[0]
        .concept
        .as_ref()
        .expect("concepts should be present");
    assert_eq!(concepts.len(), 4);

    assert!(vs.extensions.contains_key("text"));
}

#[test]
fn parse_code_system_example() {
    let cs: CodeSystem = serde_json::from_value(json!({
        "resourceType": "CodeSystem",
        "url": "http://hl7.org/fhir/CodeSystem/example",
        "status": "active",
        "content": "complete",
        "concept": [
            {"code": "a"},
            {"code": "b"},
            {"code": "c"}
        ],
        "text": {"status": "generated", "div": "<div/>"}
    }))
    .unwrap();

    assert_eq!(cs.resource_type, "CodeSystem");
    assert_eq!(cs.url, "http://hl7.org/fhir/CodeSystem/example");
    assert_eq!(cs.content, CodeSystemContentMode::Complete);

    let concepts = cs.concept.as_ref().expect("concepts should be present");
    assert_eq!(concepts.len(), 3);

    assert!(cs.extensions.contains_key("text"));
}

#[test]
fn parse_structure_definition_example() {
    let sd: StructureDefinition = serde_json::from_value(json!({
        "resourceType": "StructureDefinition",
        "id": "example-composition",
        "url": "http://hl7.org/fhir/StructureDefinition/example-composition",
        "version": "4.0.1",
        "name": "ExampleComposition",
        "status": "active",
        "kind": "complex-type",
        "abstract": false,
        "type": "Composition",
        "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Composition",
        "derivation": "constraint",
        "differential": {
            "element": [
                {"id": "Composition", "path": "Composition", "min": 0, "max": "*"}
            ]
        },
        "text": {"status": "generated", "div": "<div/>"}
    }))
    .unwrap();

    assert_eq!(sd.resource_type, "StructureDefinition");
    assert_eq!(sd.kind, StructureDefinitionKind::ComplexType);
    assert_eq!(sd.derivation, Some(TypeDerivationRule::Constraint));
    assert_eq!(sd.type_, "Composition");

    let differential = sd
        .differential
        .as_ref()
        .expect("differential should be present");
    assert!(!differential.element.is_empty());

    assert!(sd.extensions.contains_key("text"));
}
