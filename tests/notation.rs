//! Notation tests: field lists parsed into match cases and construction layouts.

use bitmatch::{
    bitmatch, parse_fields, parse_layout, BitCursor, Bindings, ConstructFailure, DefinitionError, Endian, EvalError,
    Kind, NotationError, Pattern, Width,
};

const IPV4_PREFIX: &str = r#"
    (* version and header length share the first byte *)
    4 : 4 ; hdrlen : 4 ; tos : 8 ; length : 16 ;
    options : (hdrlen - 5) * 32 : bitstring ;   // empty when hdrlen = 5
    ..rest
"#;

#[test]
fn test_parse_field_list() {
    let list = parse_fields(IPV4_PREFIX).expect("parse");
    assert_eq!(list.fields.len(), 5);
    assert_eq!(list.rest.as_deref(), Some("rest"));
    assert!(matches!(list.fields[0].pattern(), Pattern::Literal(_)));
    assert_eq!(list.fields[1].pattern(), &Pattern::Bind("hdrlen".to_string()));
    assert_eq!(list.fields[3].spec().width(), &Width::Const(16));
    assert!(matches!(list.fields[4].spec().width(), Width::Dynamic(_)));
    assert_eq!(list.fields[4].spec().kind(), Kind::Bits);
}

#[test]
fn test_match_with_parsed_fields() {
    let case = parse_fields(IPV4_PREFIX).expect("parse").into_case(|b| {
        (
            b.u64("hdrlen"),
            b.bits("options").map(|c| c.to_bytes()),
            b.bits("rest").map(|c| c.len()),
        )
    });
    let data = [0x46, 0x00, 0x00, 0x20, 0xde, 0xad, 0xbe, 0xef, 0x01];
    let out = bitmatch(BitCursor::from_bytes(&data), &[case]).expect("match");
    assert_eq!(out, (Some(6), Some(vec![0xde, 0xad, 0xbe, 0xef]), Some(8)));
}

#[test]
fn test_literal_mismatch_is_no_match() {
    let case = parse_fields(IPV4_PREFIX).expect("parse").into_case(|_| ());
    assert!(bitmatch(BitCursor::from_bytes(&[0x65, 0, 0, 0]), &[case]).is_err());
}

#[test]
fn test_qualifiers_and_literals() {
    let list = parse_fields(r#"_ : 8 ; "MZ" : 16 : string ; x : 32 : littleendian, signed ; 0x7f : 8"#).expect("parse");
    assert_eq!(list.fields[0].pattern(), &Pattern::Wildcard);
    assert_eq!(list.fields[1].spec().kind(), Kind::Text);
    assert_eq!(list.fields[2].spec().endian(), Endian::Little);
    assert!(list.fields[2].spec().is_signed());
    let case = list.into_case(|b| b.i64("x"));
    let data = [0, b'M', b'Z', 0xfb, 0xff, 0xff, 0xff, 0x7f];
    assert_eq!(bitmatch(BitCursor::from_bytes(&data), &[case]), Ok(Some(-5)));
}

#[test]
fn test_string_escapes() {
    let case = parse_fields(r#""\x89PNG" : 32 : string ; ..rest"#).expect("parse").into_case(|_| true);
    let data = [0x89, b'P', b'N', b'G', 0x0d];
    assert_eq!(bitmatch(BitCursor::from_bytes(&data), &[case]), Ok(true));
}

#[test]
fn test_syntax_errors() {
    assert!(matches!(parse_fields("x : "), Err(NotationError::Syntax(_))));
    assert!(matches!(parse_fields("x 8"), Err(NotationError::Syntax(_))));
    assert!(matches!(parse_fields("..a ; x : 8"), Err(NotationError::Syntax(_))));
    let msg = parse_fields("x : 8 :").unwrap_err().to_string();
    assert!(msg.starts_with("Parse error"), "{}", msg);
}

#[test]
fn test_definition_errors_surface() {
    assert_eq!(
        parse_fields("x : 65").unwrap_err(),
        NotationError::Definition(DefinitionError::IntWidth(65))
    );
    assert_eq!(
        parse_fields("x : 8 : wobbly").unwrap_err(),
        NotationError::Definition(DefinitionError::UnknownQualifier("wobbly".to_string()))
    );
    assert_eq!(
        parse_fields(r#""ab" : 16"#).unwrap_err(),
        NotationError::Definition(DefinitionError::LiteralKind(Kind::Int))
    );
    assert!(matches!(parse_fields("99999999999999999999 : 8"), Err(NotationError::Literal(_))));
    assert_eq!(
        parse_fields("x : 8 / 0 : string").unwrap_err(),
        NotationError::Definition(DefinitionError::ConstWidth(EvalError::DivideByZero))
    );
    assert_eq!(
        parse_layout("x : 9223372036854775807 * 2").unwrap_err(),
        NotationError::Definition(DefinitionError::ConstWidth(EvalError::Overflow))
    );
}

#[test]
fn test_borrowed_case_returns_payload() {
    let list = parse_fields("kind : 8 ; len : 8 ; ..payload").expect("parse");
    let frames = [[1u8, 2, 0xaa, 0xbb, 0xcc], [2, 1, 0x11, 0x22, 0x33]];
    for frame in &frames {
        let cases = [list.case(|b| {
            let len = b.u64("len").unwrap_or(0) * 8;
            (b.u64("kind"), b.bits("payload").and_then(|p| p.take_bits(len).ok()))
        })];
        let (kind, body) = bitmatch(BitCursor::from_bytes(frame), &cases).expect("match");
        let body = body.expect("payload");
        assert_eq!(Some(frame[0] as u64), kind);
        assert_eq!(body.to_bytes(), frame[2..2 + frame[1] as usize].to_vec());
    }
}

#[test]
fn test_layout_build() {
    let layout = parse_layout(r#"1 : 4 ; kind : 4 ; len : 8 ; "OK" : 16 : string ; body : len * 8 : string"#)
        .expect("layout");
    assert_eq!(layout.len(), 5);
    let values = Bindings::new().with("kind", 2u8).with("len", 3u8).with("body", "abc");
    let out = layout.build(&values).expect("build");
    assert_eq!(out.as_bytes(), &[0x12, 3, b'O', b'K', b'a', b'b', b'c']);
}

#[test]
fn test_layout_missing_value() {
    let layout = parse_layout("a : 8 ; b : 8").expect("layout");
    let err = layout.build(&Bindings::new().with("a", 1u8)).unwrap_err();
    assert_eq!(err.field, 1);
    assert_eq!(err.reason, ConstructFailure::MissingValue("b".to_string()));
}

#[test]
fn test_layout_rejects_match_only_forms() {
    assert_eq!(parse_layout("_ : 8").unwrap_err(), NotationError::Wildcard);
    assert_eq!(parse_layout("a : 8 ; ..tail").unwrap_err(), NotationError::Rest("tail".to_string()));
    assert_eq!(
        parse_layout("a : 8 : save_offset_to(at)").unwrap_err(),
        NotationError::Definition(DefinitionError::MatchOnly("save_offset_to".to_string()))
    );
}

#[test]
fn test_layout_output_matches_fields() {
    let layout = parse_layout("a : 3 ; b : 13 : littleendian ; c : 7 : signed").expect("layout");
    let values = Bindings::new().with("a", 5u8).with("b", 0x1abcu16).with("c", -3i8);
    let built = layout.build(&values).expect("build");
    let case = parse_fields("a : 3 ; b : 13 : littleendian ; c : 7 : signed")
        .expect("parse")
        .into_case(|b| (b.u64("a"), b.u64("b"), b.i64("c")));
    assert_eq!(bitmatch(built.as_cursor(), &[case]), Ok((Some(5), Some(0x1abc), Some(-3))));
}
