//! Cross-cutting properties: print idempotence, behavioural stability,
//! line-ending parity, node-id stability, translation round-trips.

mod common;

use loreline::{print, Decl, NodeId, PrintOptions, Script, Stmt};

use common::trace_source;

const CORPUS: &[&str] = &[
    "beat Start\n  Hello there.\n",
    "state\n  coffeeBeans: 5\n  milk: 2\n\nbeat OrderDrink\n  \"Remaining: coffeeBeans=$coffeeBeans milk=$milk\"\n  choice\n    \"Cappuccino\" if coffeeBeans >= 2 and milk > 0\n      coffeeBeans -= 2\n      milk -= 1\n      -> OrderDrink\n    \"Espresso\" if coffeeBeans > 0\n      coffeeBeans -= 1\n      -> OrderDrink\n",
    "character barista { name: \"Alex\", friendliness: 3 }\n\nbeat Greet\n  barista: <happy>Great to see you again!</happy>\n  if barista.friendliness > 2\n    A warm welcome indeed.\n  else if barista.friendliness > 0\n    A polite nod.\n  else\n    Silence.\n",
    "beat CounterExample\n  state\n    counter: 0\n  new state\n    tmpCounter: 0\n  \"tmpCounter=$tmpCounter counter=$counter\"\n  choice\n    Increment tmpCounter\n      tmpCounter += 1\n    Increment counter\n      counter += 1\n  -> CounterExample\n",
    "// a quiet scene\nbeat Rain\n  ~ state of the art weather\n  The rain keeps falling.\n  \"It costs 5$ < a coffee\"\n",
];

fn parse(source: &str) -> Script {
    loreline::parse(source, None, None).expect("corpus script should parse")
}

fn all_ids(script: &Script) -> Vec<NodeId> {
    fn block_ids(block: &loreline::Stmt, out: &mut Vec<NodeId>) {
        out.push(block.id());
        match block {
            Stmt::If(stmt) => {
                for inner in &stmt.then_block.stmts {
                    block_ids(inner, out);
                }
                if let Some(else_block) = &stmt.else_block {
                    for inner in &else_block.stmts {
                        block_ids(inner, out);
                    }
                }
            }
            Stmt::Choice(stmt) => {
                for option in &stmt.options {
                    out.push(option.id);
                    for inner in &option.body.stmts {
                        block_ids(inner, out);
                    }
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    for decl in &script.decls {
        out.push(decl.id());
        if let Decl::Beat(beat) = decl {
            for stmt in &beat.body.stmts {
                block_ids(stmt, &mut out);
            }
        }
    }
    out
}

#[test]
fn print_is_idempotent_across_options() {
    let option_sets = [
        PrintOptions::default(),
        PrintOptions::new("    ", "\n"),
        PrintOptions::new("\t", "\n"),
        PrintOptions::new("  ", "\r\n"),
    ];
    for source in CORPUS {
        for options in &option_sets {
            let once = print(&parse(source), options);
            let twice = print(&parse(&once), options);
            assert_eq!(once, twice, "print not idempotent for:\n{source}");
        }
    }
}

#[test]
fn printed_scripts_behave_identically() {
    let runs: &[(&str, &[usize])] = &[
        (CORPUS[1], &[0, 1, 1]),
        (CORPUS[2], &[]),
        (CORPUS[3], &[0, 1, 0]),
        (CORPUS[4], &[]),
    ];
    for (source, picks) in runs {
        let reprinted = print(&parse(source), &PrintOptions::default());
        let original = trace_source(source, picks, 24);
        let roundtrip = trace_source(&reprinted, picks, 24);
        assert_eq!(original, roundtrip, "behaviour changed after printing:\n{source}");
    }
}

#[test]
fn line_endings_do_not_change_behaviour() {
    for source in CORPUS {
        let crlf = source.replace('\n', "\r\n");
        let lf_trace = trace_source(source, &[0, 0, 1], 16);
        let crlf_trace = trace_source(&crlf, &[0, 0, 1], 16);
        assert_eq!(lf_trace, crlf_trace);
    }
}

#[test]
fn node_ids_are_stable_across_parses() {
    for source in CORPUS {
        assert_eq!(all_ids(&parse(source)), all_ids(&parse(source)));
    }
}

#[test]
fn node_ids_survive_printing() {
    for source in CORPUS {
        let script = parse(source);
        let reprinted = parse(&print(&script, &PrintOptions::default()));
        assert_eq!(all_ids(&script), all_ids(&reprinted));
    }
}

#[test]
fn translations_round_trip_every_text_node() {
    let base = parse(
        "character guide\n  name: \"Ava\"\n\nbeat Tour\n  Welcome to the hall.\n  guide: Follow me.\n  choice\n    Go left\n      The west wing.\n    Go right\n      The east wing.\n",
    );
    let localised = parse(
        "character guide\n  name: \"Ava\"\n\nbeat Tour\n  ~ Bienvenue dans le hall.\n  guide: Suivez-moi.\n  choice\n    ~ À gauche\n      ~ L'aile ouest.\n    ~ À droite\n      ~ L'aile est.\n",
    );
    let table = loreline::extract_translations(&localised);

    // every text node and prompt of the base has a localised counterpart
    let base_table = loreline::extract_translations(&base);
    assert_eq!(base_table.len(), table.len());
    for (id, _entry) in base_table.iter() {
        assert!(table.lookup(id).is_some(), "missing translation for {id}");
    }

    let source = "character guide\n  name: \"Ava\"\n\nbeat Tour\n  Welcome to the hall.\n  guide: Follow me.\n  choice\n    Go left\n      The west wing.\n    Go right\n      The east wing.\n";
    let script = common::script(source);
    let mut interp = loreline::Interpreter::new(
        script,
        loreline::Options {
            seed: Some(1),
            translations: Some(table),
            ..loreline::Options::default()
        },
    )
    .unwrap();
    let out = common::trace(&mut interp, &[0], 16);
    assert_eq!(
        out,
        [
            "Bienvenue dans le hall.",
            "Ava: Suivez-moi.",
            "[+À gauche +À droite]",
            "L'aile ouest.",
            "<finished>",
        ]
    );
}
