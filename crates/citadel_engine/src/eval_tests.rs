use super::*;

use citadel_core::Position;

#[test]
fn test_initial_position_is_tempo_symmetric() {
    // The start position is mirror-symmetric, so the side to move sees the
    // same score whichever color that is.
    let white = Position::initial();
    let black =
        Position::from_fen("clpisiplc/mmmmmmmmm/9/9/9/9/9/MMMMMMMMM/CLPISIPLC b Bb - 0 1").unwrap();

    let w = hce_eval_stm(&white);
    let b = hce_eval_stm(&black);
    assert_eq!(w, b);
    assert!(w > 0, "the move should be worth something");
}

#[test]
fn test_stm_flip_negates_the_white_diff() {
    let w = Position::from_fen("4s4/9/9/9/2L6/9/9/9/4S4 w Bb - 0 1").unwrap();
    let b = Position::from_fen("4s4/9/9/9/2L6/9/9/9/4S4 b Bb - 0 1").unwrap();
    assert_eq!(hce_eval_stm(&w), eval_static(&w));
    assert_eq!(hce_eval_stm(&b), -eval_static(&b));
}

#[test]
fn test_extra_material_helps() {
    // Catapults on both sides keep the position out of the locked-board
    // dampening, so the lancer edge shows at full size.
    let even = Position::from_fen("c3s3l/9/9/9/9/9/9/9/L3S3C w Bb - 0 1").unwrap();
    let up_a_lancer = Position::from_fen("c3s4/9/9/9/9/9/9/9/L3S3C w Bb - 0 1").unwrap();
    assert!(hce_eval_stm(&up_a_lancer) > hce_eval_stm(&even) + 200);
}

#[test]
fn test_siege_attrition_is_penalized() {
    // 16 tokens: immobilized sovereign and a flat penalty. 15: neither.
    let over = Position::from_fen("4s3c/9/9/9/RRRRRRRR1/9/9/9/3IS4 w Bb - 0 1").unwrap();
    let under = Position::from_fen("4s3c/9/9/9/RRRRRRRW1/9/9/9/3IS4 w Bb - 0 1").unwrap();
    assert_eq!(Position::from_fen("4s3c/9/9/9/RRRRRRRR1/9/9/9/3IS4 w Bb - 0 1")
        .unwrap()
        .wall_tokens(citadel_core::Color::White), 16);
    assert!(hce_eval_stm(&over) < hce_eval_stm(&under) - 100);
}

#[test]
fn test_bastion_right_is_worth_keeping_early() {
    // Full boards so the opening weight is live.
    let with = Position::initial();
    let without =
        Position::from_fen("clpisiplc/mmmmmmmmm/9/9/9/9/9/MMMMMMMMM/CLPISIPLC w b - 0 1").unwrap();
    assert!(hce_eval_stm(&with) > hce_eval_stm(&without));
}

#[test]
fn test_no_catapult_mason_walls_dampen_score() {
    // White is a whole minister up, but with masons on the board, no
    // catapults anywhere and walls already standing, the position is nearly
    // frozen: the dampening squeezes the score toward zero.
    let locked = Position::from_fen("4s4/4m4/ww7/9/9/9/WW7/4MI3/4S4 w Bb - 0 1").unwrap();
    let eval = hce_eval_stm(&locked);
    assert!(eval > 0, "material edge should survive the sign");
    assert!(eval < 150, "dampening should crush the magnitude, got {eval}");

    // Hand White a catapult and the freeze lifts: monopoly bonus plus full
    // material value.
    let with_cat = Position::from_fen("4s4/4m4/ww7/9/9/9/WW7/4MI3/3CS4 w Bb - 0 1").unwrap();
    assert!(hce_eval_stm(&with_cat) > eval + 200);
}

#[test]
fn test_entombment_pressure_rewards_walling_in() {
    // White walls hugging the cornered Black sovereign, catapults placed so
    // no ray touches the corner in either position.
    let some = Position::from_fen("sW7/W8/9/7c1/9/4C4/9/9/4S4 w Bb - 0 1").unwrap();
    let none = Position::from_fen("s8/9/9/7c1/9/4C4/9/9/4S4 w Bb - 0 1").unwrap();
    assert!(hce_eval_stm(&some) > hce_eval_stm(&none));
}

#[test]
fn test_evaluate_position_stm_falls_back_to_hce() {
    // NNUE backend with no model (or an unloaded one) silently scores HCE.
    let pos = Position::initial();
    let hce = evaluate_position_stm(&pos, EvalBackend::Hce, None);
    assert_eq!(evaluate_position_stm(&pos, EvalBackend::Nnue, None), hce);

    let empty_net = Nnue::new();
    assert!(!empty_net.loaded());
    assert_eq!(
        evaluate_position_stm(&pos, EvalBackend::Nnue, Some(&empty_net)),
        hce
    );
}
