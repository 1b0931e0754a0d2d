use crate::processor::{Processor, ProcessorState, SimConfig};

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SimError;
    use crate::instructions::WordType;

    #[test]
    fn test_single_add() {
        let mut harness = TestHarness::default();
        harness.run(&["ADD R1, R2, R3"]);
        harness.assert_reg_value("R1", 0);

        let metrics = harness.processor.get_metrics();
        assert_eq!(metrics.committed_instructions, 1);
        assert_eq!(metrics.total_cycles, 2);
        assert_eq!(metrics.bubble_cycles, 0);
        assert!((metrics.ipc - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_from_seeded_memory() {
        let mut harness = TestHarness::default();
        harness.run(&["LD R1, 0(R0)", "LD R2, 4(R0)"]);
        harness.assert_reg_value("R1", 10);
        harness.assert_reg_value("R2", 20);
    }

    #[test]
    fn test_forwarding_chain() {
        let mut harness = TestHarness::default();
        harness.run(&["LD R1, 0(R0)", "ADD R2, R1, R1", "MUL R3, R2, R2"]);
        harness.assert_reg_value("R1", 10);
        harness.assert_reg_value("R2", 20);
        harness.assert_reg_value("R3", 400);
    }

    // A RAW dependency: the MUL must hold the ADD station's tag at issue and
    // resolve it only once the ADD's latency has elapsed and broadcast.
    #[test]
    fn test_renaming_tag_resolved_by_broadcast() {
        let mut latencies = HashMap::new();
        latencies.insert("ADD".to_string(), 3);
        let config = SimConfig { latencies, ..SimConfig::default() };

        let mut harness = TestHarness::with_config(&config);
        harness.load(&["ADD R1, R2, R3", "MUL R4, R1, R5"]);

        harness.step_expect(true);
        let state = harness.processor.get_state();
        assert_eq!(register(&state, "R1").producer.as_deref(), Some("Add0"));

        harness.step_expect(true);
        let state = harness.processor.get_state();
        assert_eq!(register(&state, "R4").producer.as_deref(), Some("Mul0"));
        let mul = station(&state, "Mul0");
        assert!(mul.busy);
        assert_eq!(mul.qj.as_deref(), Some("Add0"));
        assert_eq!(mul.vk, Some(0));

        // the ADD is still executing; the tag stays unresolved
        harness.step_expect(true);
        let state = harness.processor.get_state();
        assert_eq!(station(&state, "Mul0").qj.as_deref(), Some("Add0"));

        // ADD completes and broadcasts; the MUL operand becomes a value
        harness.step_expect(true);
        let state = harness.processor.get_state();
        let mul = station(&state, "Mul0");
        assert!(mul.busy);
        assert_eq!(mul.qj, None);
        assert_eq!(mul.vj, Some(0));

        harness.run_to_completion();
        let metrics = harness.processor.get_metrics();
        assert_eq!(metrics.committed_instructions, 2);
        assert_eq!(metrics.total_cycles, 5);
    }

    // Eight independent ADDs on two add stations: issue must stall on the
    // saturated pool, without any of those cycles counting as bubbles.
    #[test]
    fn test_structural_hazard_on_add_stations() {
        let mut latencies = HashMap::new();
        latencies.insert("ADD".to_string(), 2);
        let config = SimConfig { n_add: 2, latencies, ..SimConfig::default() };

        let mut harness = TestHarness::with_config(&config);
        harness.run(&[
            "ADD R1, R0, R0",
            "ADD R2, R0, R0",
            "ADD R3, R0, R0",
            "ADD R4, R0, R0",
            "ADD R5, R0, R0",
            "ADD R6, R0, R0",
            "ADD R7, R0, R0",
            "ADD R8, R0, R0",
        ]);

        let metrics = harness.processor.get_metrics();
        assert_eq!(metrics.committed_instructions, 8);
        assert_eq!(metrics.bubble_cycles, 0);
        // without the stalls (issue every cycle) this would finish in 10
        assert_eq!(metrics.total_cycles, 13);
    }

    #[test]
    fn test_structural_hazard_on_rob_capacity() {
        let mut latencies = HashMap::new();
        latencies.insert("ADD".to_string(), 2);
        let config = SimConfig { n_add: 4, rob_capacity: 2, latencies, ..SimConfig::default() };

        let mut harness = TestHarness::with_config(&config);
        harness.run(&[
            "ADD R1, R0, R0",
            "ADD R2, R0, R0",
            "ADD R3, R0, R0",
            "ADD R4, R0, R0",
        ]);

        let metrics = harness.processor.get_metrics();
        assert_eq!(metrics.committed_instructions, 4);
        assert_eq!(metrics.bubble_cycles, 0);
        assert_eq!(metrics.total_cycles, 7);
    }

    // An early-finishing instruction must wait for the older ROB head.
    #[test]
    fn test_in_order_commit() {
        let mut latencies = HashMap::new();
        latencies.insert("MUL".to_string(), 3);
        let config = SimConfig { latencies, ..SimConfig::default() };

        let mut harness = TestHarness::with_config(&config);
        harness.load(&["MUL R1, R2, R3", "ADD R4, R5, R6"]);

        harness.step_expect(true);
        harness.step_expect(true);
        harness.step_expect(true);

        // the ADD has written its result but cannot pass the MUL
        let state = harness.processor.get_state();
        let add_entry = state.reorder_buffer[1].as_ref().unwrap();
        assert!(add_entry.ready);
        assert_eq!(state.metrics.committed_instructions, 0);

        harness.step_expect(true);
        assert_eq!(harness.processor.get_metrics().committed_instructions, 1);

        harness.step_expect(false);
        let metrics = harness.processor.get_metrics();
        assert_eq!(metrics.committed_instructions, 2);
        assert_eq!(metrics.total_cycles, 5);
        assert!(metrics.ipc <= 1.0);
    }

    #[test]
    fn test_bubble_cycles_while_latency_elapses() {
        let mut latencies = HashMap::new();
        latencies.insert("MUL".to_string(), 3);
        let config = SimConfig { latencies, ..SimConfig::default() };

        let mut harness = TestHarness::with_config(&config);
        harness.run(&["MUL R1, R2, R3"]);

        let metrics = harness.processor.get_metrics();
        assert_eq!(metrics.total_cycles, 4);
        assert_eq!(metrics.bubble_cycles, 2);
        assert!((metrics.ipc - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_division() {
        let mut harness = TestHarness::default();
        harness.run(&["LD R1, 0(R0)", "LD R2, 4(R0)", "DIV R3, R2, R1"]);
        harness.assert_reg_value("R3", 2);
    }

    #[test]
    fn test_division_by_zero_faults_during_execute() {
        let mut harness = TestHarness::default();
        harness.load(&["DIV R1, R2, R3"]);

        // issue succeeds; the fault only fires once the operands resolve
        assert_eq!(harness.processor.step(), Ok(true));
        assert_eq!(harness.processor.step(), Err(SimError::DivisionByZero));
    }

    // The store writes the base register's value at the address fixed at
    // issue time; the younger load observes it.
    #[test]
    fn test_store_then_load() {
        let mut harness = TestHarness::default();
        harness.run(&["LD R1, 0(R0)", "ST R9, 4(R1)", "LD R4, 4(R0)"]);
        harness.assert_reg_value("R4", 10);

        // stores have no destination register: R9 is untouched and unrenamed
        let state = harness.processor.get_state();
        assert_eq!(register(&state, "R9").value, 0);
        assert_eq!(register(&state, "R9").producer, None);
    }

    // Branches and jumps are dataflow ops only: outcomes are computed into
    // the ROB but never steer the instruction stream.
    #[test]
    fn test_branches_commit_without_control_effects() {
        let mut harness = TestHarness::default();
        harness.run(&["BEQ R1, R2, 8", "BNE R1, R2, 8", "J 4"]);

        let metrics = harness.processor.get_metrics();
        assert_eq!(metrics.committed_instructions, 3);
        assert_eq!(metrics.total_cycles, 4);

        let state = harness.processor.get_state();
        for reg in &state.registers {
            assert_eq!(reg.value, 0);
            assert_eq!(reg.producer, None);
        }
    }

    #[test]
    fn test_state_after_loading_empty_program() {
        let mut harness = TestHarness::default();
        harness.load(&[]);

        let state = harness.processor.get_state();
        assert_eq!(state.cycle, 0);
        assert!(!state.is_finished);
        assert!(state.reservation_stations.iter().all(|rs| !rs.busy));
        assert!(state.reorder_buffer.iter().all(|slot| slot.is_none()));
        assert_eq!(state.reorder_buffer.len(), 8);
        assert!(state.registers.iter().all(|reg| reg.value == 0 && reg.producer.is_none()));
        assert_eq!(state.metrics.total_cycles, 0);
        assert!(state.metrics.ipc.abs() < f64::EPSILON);

        harness.step_expect(false);
        assert_eq!(harness.processor.get_metrics().bubble_cycles, 0);
    }

    #[test]
    fn test_load_failure_aborts() {
        let mut harness = TestHarness::default();
        let result = harness.processor.load_program(&["ADD R1, R2, R3", "FROBNICATE R1"]);
        assert!(matches!(result, Err(SimError::MalformedInstruction(_))));
    }

    #[test]
    fn test_reload_resets_all_state() {
        let mut harness = TestHarness::default();
        harness.run(&["LD R1, 0(R0)", "ADD R2, R1, R1"]);
        harness.assert_reg_value("R2", 20);

        harness.load(&["ADD R3, R1, R1"]);
        let state = harness.processor.get_state();
        assert_eq!(state.cycle, 0);
        // registers are rebuilt, so R1 is back to 0
        assert_eq!(register(&state, "R1").value, 0);

        harness.run_to_completion();
        harness.assert_reg_value("R3", 0);
    }

    fn register<'a>(state: &'a ProcessorState, name: &str) -> &'a crate::processor::RegisterSnapshot {
        state
            .registers
            .iter()
            .find(|reg| reg.name == name)
            .unwrap_or_else(|| panic!("no register named {}", name))
    }

    fn station<'a>(state: &'a ProcessorState, name: &str) -> &'a crate::processor::StationSnapshot {
        state
            .reservation_stations
            .iter()
            .find(|rs| rs.name == name)
            .unwrap_or_else(|| panic!("no station named {}", name))
    }

    struct TestHarness {
        processor: Processor,
    }

    impl TestHarness {
        fn default() -> TestHarness {
            TestHarness::with_config(&SimConfig::default())
        }

        fn with_config(config: &SimConfig) -> TestHarness {
            TestHarness { processor: Processor::new(config) }
        }

        fn load(&mut self, program: &[&str]) {
            self.processor.load_program(program).unwrap();
        }

        fn run(&mut self, program: &[&str]) {
            self.load(program);
            self.run_to_completion();
        }

        fn run_to_completion(&mut self) {
            for _ in 0..10_000 {
                if !self.processor.step().unwrap() {
                    return;
                }
            }
            panic!("simulation did not terminate");
        }

        fn step_expect(&mut self, more: bool) {
            assert_eq!(self.processor.step().unwrap(), more);
        }

        fn assert_reg_value(&self, name: &str, value: WordType) {
            let state = self.processor.get_state();
            let reg = register(&state, name);
            assert_eq!(reg.value, value, "register {}", name);
        }
    }
}
