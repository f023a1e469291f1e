//! End-to-end scenarios: complete source programs fed to a configured
//! program, followed by frame-by-frame runs.

use std::cell::RefCell;
use std::rc::Rc;

use volsung::{parse_program, Program};

fn build(source: &str, inputs: usize, outputs: usize) -> Program {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut program = Program::new();
    program.configure_io(inputs, outputs);
    program.reset();
    assert!(
        parse_program(source, &mut program),
        "program failed to parse:\n{source}"
    );
    program
}

#[test]
fn silent_oscillator_stays_at_zero() {
    let mut program = build("osc~ 0 -> output\n", 0, 1);
    for _ in 0..4 {
        assert_eq!(program.run(&[]), vec![0.0]);
    }
}

#[test]
fn inline_multiplier_doubles_the_input() {
    let mut program = build("input -> *2 -> output\n", 1, 1);
    let heard: Vec<f32> = [1.0, 2.0, 3.0]
        .into_iter()
        .map(|x| program.run_sample(x))
        .collect();
    assert_eq!(heard, vec![2.0, 4.0, 6.0]);
}

#[test]
fn expression_declarations_evaluate_at_parse_time() {
    let program = build("x: (1+2)*3^2\n", 0, 0);
    assert_eq!(program.get_symbol_value("x").unwrap().number().unwrap(), 27.0);
}

#[test]
fn sequence_indexing_and_length() {
    let program = build("s: {1, 2, 3, 4}\ny: s[-1] + length_of(s)\n", 0, 0);
    assert_eq!(program.get_symbol_value("y").unwrap().number().unwrap(), 8.0);
}

#[test]
fn group_of_adders_sums_into_the_output() {
    let source = "\
adders: [4] add~ 1
input|0 -> adders[0]
input|1 -> adders[1]
input|2 -> adders[2]
input|3 -> adders[3]
adders >> output
";
    let mut program = build(source, 4, 1);
    assert_eq!(program.run(&[10.0, 20.0, 30.0, 40.0]), vec![104.0]);
}

#[test]
fn subgraph_parameter_scales_the_signal() {
    let source = "\
amp(1, 1): {
    input -> *_1 -> output
}
input -> amp~ 5 -> output
";
    let mut program = build(source, 1, 1);
    assert_eq!(program.run_sample(2.0), 10.0);
}

#[test]
fn delay_line_shifts_the_signal() {
    let mut program = build("input -> delay~ 2 -> output\n", 1, 1);
    let heard: Vec<f32> = [1.0, 2.0, 3.0, 4.0]
        .into_iter()
        .map(|x| program.run_sample(x))
        .collect();
    assert_eq!(heard, vec![0.0, 0.0, 1.0, 2.0]);
}

#[test]
fn noise_fills_the_output_with_bounded_samples() {
    let mut program = build("noise~ -> output\n", 0, 1);
    let samples: Vec<f32> = (0..32).map(|_| program.run_sample(0.0)).collect();
    assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    assert!(samples.windows(2).any(|pair| pair[0] != pair[1]));
}

#[test]
fn host_created_user_objects_join_the_graph() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut program = Program::new();
    program.configure_io(1, 1);
    program.reset();
    program
        .create_user_object(
            "clip",
            1,
            1,
            Box::new(|inputs, outputs| outputs[0] = inputs[0].clamp(-1.0, 1.0)),
        )
        .unwrap();

    assert!(parse_program("input -> clip -> output\n", &mut program));
    assert_eq!(program.run_sample(3.0), 1.0);
    assert_eq!(program.run_sample(-0.5), -0.5);
}

#[test]
fn host_workflow_with_directive_and_finish() {
    // The shape of a typical embedding: register a directive, parse a
    // program that both makes sound and configures the host, run, finish.
    let _ = env_logger::builder().is_test(true).try_init();
    let mut program = Program::new();
    program.configure_io(1, 1);
    program.reset();

    let frames = Rc::new(RefCell::new(0usize));
    let inner = Rc::clone(&frames);
    program.add_directive(
        "config",
        Rc::new(move |args, _| {
            *inner.borrow_mut() = args[0].number().unwrap().re() as usize;
        }),
    );

    let source = "\
osc~ 440 -> output

&config 4, 1
";
    assert!(parse_program(source, &mut program));

    let requested = *frames.borrow();
    assert_eq!(requested, 4);
    for _ in 0..requested {
        let out = program.run_sample(0.0);
        assert!(out.is_finite());
        assert!((-1.0..=1.0).contains(&out));
    }
    program.finish();
}

#[test]
fn diagnostics_reach_the_host_sink_once_per_error() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut program = Program::new();
    program.configure_io(0, 1);
    program.reset();

    let messages = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&messages);
    program.set_diagnostic_callback(Box::new(move |diagnostic| {
        sink.borrow_mut().push(diagnostic.message.clone());
    }));

    assert!(!parse_program("undefined -> output\n", &mut program));
    assert_eq!(messages.borrow().len(), 1);
    assert!(messages.borrow()[0].contains("Line 1"));
}

#[test]
fn print_procedure_reports_values_through_the_sink() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut program = Program::new();
    program.configure_io(0, 0);
    program.reset();

    let messages = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&messages);
    program.set_diagnostic_callback(Box::new(move |diagnostic| {
        sink.borrow_mut().push(diagnostic.message.clone());
    }));

    assert!(parse_program("probe: print({1, 2} + 1)\n", &mut program));
    assert_eq!(messages.borrow().as_slice(), ["{ 2.000, 3.000 }".to_owned()]);
}
