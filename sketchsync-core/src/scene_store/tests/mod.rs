/*
    Scenario tests for the scene_store subsystem

    Test suite covering:
    - Convergence under reordered and duplicated delivery
    - Undo/redo over a live scene, debounce included
    - Concurrent edits from two replicas followed by undo
    - Sync messages between scenes
    - Snapshot persistence and reload
*/

pub mod concurrent_edit_tests;
pub mod convergence_tests;
