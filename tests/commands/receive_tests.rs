use super::*;

#[test]
fn all_should_select_everything() {
    assert_eq!(parse_selection(" All ", 2), Some(vec![0, 1]));
    assert_eq!(parse_selection("a", 0), Some(vec![]));
}

#[test]
fn blank_answer_should_not_count_as_approval() {
    assert_eq!(parse_selection("\n", 3), None);
    assert_eq!(parse_selection("   ", 3), None);
    assert_eq!(parse_selection(" , ", 3), None);
}

#[test]
fn none_should_select_nothing() {
    assert_eq!(parse_selection("n", 3), Some(vec![]));
    assert_eq!(parse_selection("NONE\n", 3), Some(vec![]));
}

#[test]
fn numbers_should_map_to_offer_order_without_duplicates() {
    assert_eq!(parse_selection("3,1", 3), Some(vec![0, 2]));
    assert_eq!(parse_selection("2 2, 3", 3), Some(vec![1, 2]));
}

#[test]
fn out_of_range_or_garbage_should_be_rejected() {
    assert_eq!(parse_selection("0", 3), None);
    assert_eq!(parse_selection("4", 3), None);
    assert_eq!(parse_selection("1,x", 3), None);
}
