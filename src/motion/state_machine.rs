//! Behavioral state machine: IDLE, TRANSIT_IDLE, STAND, TRANSIT_STAND and WALK.
//!
//! START toggles between IDLE and STAND, BACK toggles between STAND and WALK. The two
//! TRANSIT states only run their `enter` and immediately land in the state they lead
//! to, so every transition finishes inside the frame that triggered it.
use core::fmt::{self, Display, Formatter};

use embassy_sync::blocking_mutex::raw::RawMutex;
use log::info;

use crate::bus::{AbortCommand, ProcessName, Status};
use crate::input::event::{Axis, Button, ButtonEdges, ControllerEvent};
use crate::kinematics::keyframe::Keyframe;
use crate::motion::context::MotionContext;
use crate::motion::filter::DriveMode;
use crate::robot::servo::{ActuatorBoard, BoardError};
use crate::robot::state::BodyState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotStateName {
    Idle,
    TransitIdle,
    Stand,
    TransitStand,
    Walk,
}

impl Display for RobotStateName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            RobotStateName::Idle => "IDLE",
            RobotStateName::TransitIdle => "TRANSIT_IDLE",
            RobotStateName::Stand => "STAND",
            RobotStateName::TransitStand => "TRANSIT_STAND",
            RobotStateName::Walk => "WALK",
        };
        f.write_str(name)
    }
}

/// Body command built from the STAND inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandState {
    target: BodyState,
    holding_rest: bool,
}

impl StandState {
    pub fn target(&self) -> &BodyState {
        &self.target
    }

    pub fn is_holding_rest(&self) -> bool {
        self.holding_rest
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WalkState {
    rotation_input: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RobotState {
    Idle,
    TransitIdle,
    Stand(StandState),
    TransitStand,
    Walk(WalkState),
}

impl RobotState {
    fn from_name(name: RobotStateName, standing: BodyState) -> Self {
        match name {
            RobotStateName::Idle => RobotState::Idle,
            RobotStateName::TransitIdle => RobotState::TransitIdle,
            RobotStateName::Stand => RobotState::Stand(StandState {
                target: standing,
                holding_rest: false,
            }),
            RobotStateName::TransitStand => RobotState::TransitStand,
            RobotStateName::Walk => RobotState::Walk(WalkState::default()),
        }
    }

    pub fn name(&self) -> RobotStateName {
        match self {
            RobotState::Idle => RobotStateName::Idle,
            RobotState::TransitIdle => RobotStateName::TransitIdle,
            RobotState::Stand(_) => RobotStateName::Stand,
            RobotState::TransitStand => RobotStateName::TransitStand,
            RobotState::Walk(_) => RobotStateName::Walk,
        }
    }

    /// The state a pass-through state continues to.
    fn landing(&self) -> Option<RobotStateName> {
        match self {
            RobotState::TransitIdle => Some(RobotStateName::Idle),
            RobotState::TransitStand => Some(RobotStateName::Stand),
            _ => None,
        }
    }

    async fn enter<B: ActuatorBoard, M: RawMutex>(
        &mut self,
        ctx: &mut MotionContext<'_, B, M>,
        from: RobotStateName,
    ) -> Result<(), BoardError> {
        match self {
            RobotState::Idle => {
                let result = ctx.servos.deactivate().await;
                ctx.bus.publish_abort(AbortCommand::Abort);
                ctx.bus.publish_lcd(ProcessName::MotionController, Status::Off);
                result
            }
            RobotState::TransitIdle => ctx.hold_rest().await,
            RobotState::TransitStand => {
                ctx.servos.activate().await?;
                ctx.bus.publish_abort(AbortCommand::Activate);
                ctx.bus.publish_lcd(ProcessName::MotionController, Status::On);
                ctx.hold_rest().await
            }
            RobotState::Stand(stand) => {
                ctx.filters.use_transit_dynamics();
                ctx.filters.set_mode(DriveMode::Body);
                if core::mem::take(&mut ctx.rest_requested) {
                    stand.holding_rest = true;
                    return ctx.hold_rest().await;
                }
                if from == RobotStateName::TransitStand {
                    // rise from the lying stance
                    let lying = ctx.lying_body();
                    ctx.filters.body.reset(&lying);
                }
                ctx.filters.body.set_target(&stand.target);
                Ok(())
            }
            RobotState::Walk(_) => {
                ctx.gait.reset();
                ctx.keyframes.reset_movement();
                ctx.keyframes.reset_body_adjustments();
                ctx.keyframes.reset_walking_state(Keyframe::new(*ctx.gait.feet()));
                ctx.filters.use_walk_dynamics();
                ctx.filters.set_mode(DriveMode::Body);
                Ok(())
            }
        }
    }

    fn exit<B: ActuatorBoard, M: RawMutex>(&mut self, ctx: &mut MotionContext<'_, B, M>) {
        match self {
            RobotState::Stand(_) => ctx.poses.clear(),
            RobotState::Walk(_) => {
                ctx.keyframes.reset_movement();
                ctx.filters.use_transit_dynamics();
            }
            _ => {}
        }
    }

    async fn handle_event<B: ActuatorBoard, M: RawMutex>(
        &mut self,
        ctx: &mut MotionContext<'_, B, M>,
        event: &ControllerEvent,
        previous: &ControllerEvent,
        edges: &ButtonEdges,
    ) -> Result<Option<RobotStateName>, BoardError> {
        match self {
            RobotState::Stand(stand) => stand.handle_event(ctx, event, previous, edges).await,
            RobotState::Walk(walk) => walk.handle_event(ctx, event, previous, edges).await,
            _ => Ok(None),
        }
    }

    fn update<B: ActuatorBoard, M: RawMutex>(&mut self, ctx: &mut MotionContext<'_, B, M>) {
        match self {
            RobotState::Stand(stand) => stand.update(ctx),
            RobotState::Walk(walk) => walk.update(ctx),
            _ => {}
        }
    }
}

impl StandState {
    async fn handle_event<B: ActuatorBoard, M: RawMutex>(
        &mut self,
        ctx: &mut MotionContext<'_, B, M>,
        event: &ControllerEvent,
        previous: &ControllerEvent,
        edges: &ButtonEdges,
    ) -> Result<Option<RobotStateName>, BoardError> {
        if edges.pressed(Button::A) {
            self.holding_rest = true;
            ctx.hold_rest().await?;
            return Ok(None);
        }

        let pose = if edges.pressed(Button::R1) {
            ctx.poses.next()
        } else if edges.pressed(Button::L1) {
            ctx.poses.previous()
        } else {
            None
        };
        if let Some(pose) = pose {
            self.holding_rest = false;
            ctx.filters.set_mode(DriveMode::Pose);
            ctx.filters.joints.set_target(&pose.angles);
            return Ok(None);
        }

        let control = ctx.config.control;
        let threshold = ctx.config.input.axis_threshold;
        let changed = |axis| event.axis_changed(previous, axis, threshold);
        let angles = &mut self.target.angles;
        let mut body_input = false;

        if edges.dpad_y != 0 {
            angles.psi = (angles.psi + edges.dpad_y as f32 * control.pitch_step)
                .clamp(-control.max_pitch, control.max_pitch);
            body_input = true;
        }
        if edges.dpad_x != 0 {
            angles.omega = (angles.omega + edges.dpad_x as f32 * control.roll_step)
                .clamp(-control.max_roll, control.max_roll);
            body_input = true;
        }
        if changed(Axis::LeftY) {
            angles.psi = event.axis(Axis::LeftY) * control.max_pitch;
            body_input = true;
        }
        if changed(Axis::LeftX) {
            angles.omega = event.axis(Axis::LeftX) * control.max_roll;
            body_input = true;
        }
        if changed(Axis::RightX) {
            angles.phi = event.axis(Axis::RightX) * control.max_yaw;
            body_input = true;
        }
        if changed(Axis::RightY) {
            let stick = event.axis(Axis::RightY);
            let default = ctx.config.stance.default_stand_height;
            let height = if stick >= 0.0 {
                default + stick * (control.max_height - default)
            } else {
                default + stick * (default - control.min_height)
            };
            self.target.position.y = height.clamp(control.min_height, control.max_height);
            body_input = true;
        }

        if body_input {
            self.holding_rest = false;
            ctx.filters.set_mode(DriveMode::Body);
            ctx.filters.body.set_target(&self.target);
        }
        Ok(None)
    }

    fn update<B: ActuatorBoard, M: RawMutex>(&mut self, ctx: &mut MotionContext<'_, B, M>) {
        if self.holding_rest {
            return;
        }
        match ctx.filters.mode() {
            DriveMode::Pose => ctx.drive_joints(),
            DriveMode::Body => {
                let body = ctx.filters.body.step();
                ctx.drive_body(&body);
            }
        }
    }
}

impl WalkState {
    async fn handle_event<B: ActuatorBoard, M: RawMutex>(
        &mut self,
        ctx: &mut MotionContext<'_, B, M>,
        event: &ControllerEvent,
        previous: &ControllerEvent,
        edges: &ButtonEdges,
    ) -> Result<Option<RobotStateName>, BoardError> {
        if edges.pressed(Button::A) {
            // STAND writes the rest position on entry
            ctx.rest_requested = true;
            return Ok(Some(RobotStateName::Stand));
        }

        let threshold = ctx.config.input.axis_threshold;
        let changed = |axis| event.axis_changed(previous, axis, threshold);
        let keyframes = &mut ctx.keyframes;
        if changed(Axis::LeftY) {
            keyframes.set_forward_factor(event.axis(Axis::LeftY));
        }
        if changed(Axis::LeftX) {
            self.rotation_input = event.axis(Axis::LeftX);
        }
        if changed(Axis::RightY) {
            keyframes.set_lean(event.axis(Axis::RightY));
        }
        if changed(Axis::RightX) {
            keyframes.set_height_offset(event.axis(Axis::RightX));
        }
        if edges.dpad_y != 0 {
            keyframes.adjust_walking_speed(edges.dpad_y);
            info!("[MOTION_TASK] walking speed {}", keyframes.walking_speed());
        }
        if edges.pressed(Button::L3) {
            keyframes.reset_movement();
            self.rotation_input = 0.0;
        }
        if edges.pressed(Button::R3) {
            keyframes.reset_body_adjustments();
        }
        Ok(None)
    }

    fn update<B: ActuatorBoard, M: RawMutex>(&mut self, ctx: &mut MotionContext<'_, B, M>) {
        ctx.keyframes.set_rotation_factor(self.rotation_input);
        for _ in 0..ctx.keyframes.advance() {
            let frame = ctx.gait.step(ctx.keyframes.velocity_command());
            ctx.keyframes.push(Keyframe::new(frame.feet));
        }
        let keyframe = ctx.keyframes.interpolate();
        let body = BodyState {
            position: ctx.gait.body() + ctx.keyframes.body_offset(),
            angles: Default::default(),
            feet: keyframe.feet,
        };
        ctx.filters.body.set_target(&body);
        let filtered = ctx.filters.body.step();
        ctx.drive_body(&filtered);
    }
}

pub struct StateMachine {
    state: RobotState,
    previous_event: ControllerEvent,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: RobotState::Idle,
            previous_event: ControllerEvent::default(),
        }
    }

    pub fn state(&self) -> &RobotState {
        &self.state
    }

    pub fn name(&self) -> RobotStateName {
        self.state.name()
    }

    pub async fn handle_event<B: ActuatorBoard, M: RawMutex>(
        &mut self,
        ctx: &mut MotionContext<'_, B, M>,
        event: ControllerEvent,
    ) -> Result<(), BoardError> {
        let previous = core::mem::replace(&mut self.previous_event, event);
        let edges = event.edges(&previous);

        let next = match self.state.name() {
            RobotStateName::Idle if edges.pressed(Button::Start) => Some(RobotStateName::TransitStand),
            RobotStateName::Stand | RobotStateName::Walk if edges.pressed(Button::Start) => {
                Some(RobotStateName::TransitIdle)
            }
            RobotStateName::Stand if edges.pressed(Button::Back) => Some(RobotStateName::Walk),
            RobotStateName::Walk if edges.pressed(Button::Back) => Some(RobotStateName::Stand),
            _ => self.state.handle_event(ctx, &event, &previous, &edges).await?,
        };
        match next {
            Some(next) => self.transition(ctx, next).await,
            None => Ok(()),
        }
    }

    pub fn update<B: ActuatorBoard, M: RawMutex>(&mut self, ctx: &mut MotionContext<'_, B, M>) {
        self.state.update(ctx);
    }

    /// Drives the robot to IDLE through TRANSIT_IDLE unless it is already idle.
    pub async fn force_idle<B: ActuatorBoard, M: RawMutex>(
        &mut self,
        ctx: &mut MotionContext<'_, B, M>,
    ) -> Result<(), BoardError> {
        if self.name() == RobotStateName::Idle {
            return Ok(());
        }
        self.transition(ctx, RobotStateName::TransitIdle).await
    }

    async fn transition<B: ActuatorBoard, M: RawMutex>(
        &mut self,
        ctx: &mut MotionContext<'_, B, M>,
        mut next: RobotStateName,
    ) -> Result<(), BoardError> {
        loop {
            let from = self.state.name();
            if next == from {
                return Ok(());
            }
            self.state.exit(ctx);
            self.state = RobotState::from_name(next, ctx.standing_body());
            info!("[MOTION_TASK] {from} -> {next}");
            self.state.enter(ctx, from).await?;
            match self.state.landing() {
                Some(landing) => next = landing,
                None => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use crate::config::RobotConfig;
    use crate::input::event::BUTTONS;
    use crate::robot::mock::MockBoard;
    use approx::assert_abs_diff_eq;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn press(button: Button) -> ControllerEvent {
        let mut buttons = [false; 10];
        buttons[button as usize] = true;
        ControllerEvent::new([0.0; 6], buttons, [0, 0])
    }

    fn stick(axis: Axis, value: f32) -> ControllerEvent {
        let mut axes = [0.0; 6];
        axes[axis as usize] = value;
        ControllerEvent::new(axes, [false; 10], [0, 0])
    }

    fn tap<B: ActuatorBoard>(
        machine: &mut StateMachine,
        ctx: &mut MotionContext<'_, B, NoopRawMutex>,
        button: Button,
    ) {
        block_on(machine.handle_event(ctx, press(button))).unwrap();
        block_on(machine.handle_event(ctx, ControllerEvent::default())).unwrap();
    }

    #[test]
    fn start_activates_and_lands_in_stand() {
        let config = RobotConfig::DEFAULT;
        let bus = MessageBus::<NoopRawMutex>::new();
        let mut ctx = MotionContext::new(&config, MockBoard::default(), &bus);
        let mut machine = StateMachine::new();
        assert_eq!(machine.name(), RobotStateName::Idle);

        tap(&mut machine, &mut ctx, Button::Start);
        assert_eq!(machine.name(), RobotStateName::Stand);
        assert!(ctx.servos.is_active());
        assert_eq!(ctx.servos.board().writes.len(), 12);
        let timeout = embassy_time::Duration::from_millis(1);
        assert_eq!(block_on(bus.receive_abort(timeout)), Some(AbortCommand::Activate));
        assert_eq!(
            block_on(bus.receive_lcd(timeout)),
            Some((ProcessName::MotionController, Status::On))
        );
    }

    #[test]
    fn start_again_rests_and_deactivates() {
        let config = RobotConfig::DEFAULT;
        let bus = MessageBus::<NoopRawMutex>::new();
        let mut ctx = MotionContext::new(&config, MockBoard::default(), &bus);
        let mut machine = StateMachine::new();
        tap(&mut machine, &mut ctx, Button::Start);
        tap(&mut machine, &mut ctx, Button::Back);
        assert_eq!(machine.name(), RobotStateName::Walk);

        tap(&mut machine, &mut ctx, Button::Start);
        assert_eq!(machine.name(), RobotStateName::Idle);
        assert!(!ctx.servos.is_active());
        assert_eq!(ctx.servos.board().deactivations, 1);
        // activate rest and transit-idle rest; the board already rests when it powers down
        assert_eq!(ctx.servos.board().writes.len(), 24);
    }

    #[test]
    fn back_toggles_between_stand_and_walk() {
        let config = RobotConfig::DEFAULT;
        let bus = MessageBus::<NoopRawMutex>::new();
        let mut ctx = MotionContext::new(&config, MockBoard::default(), &bus);
        let mut machine = StateMachine::new();

        tap(&mut machine, &mut ctx, Button::Back);
        assert_eq!(machine.name(), RobotStateName::Idle);
        tap(&mut machine, &mut ctx, Button::Start);
        tap(&mut machine, &mut ctx, Button::Back);
        assert_eq!(machine.name(), RobotStateName::Walk);
        tap(&mut machine, &mut ctx, Button::Back);
        assert_eq!(machine.name(), RobotStateName::Stand);
    }

    #[test]
    fn held_button_does_not_retrigger() {
        let config = RobotConfig::DEFAULT;
        let bus = MessageBus::<NoopRawMutex>::new();
        let mut ctx = MotionContext::new(&config, MockBoard::default(), &bus);
        let mut machine = StateMachine::new();
        for _ in 0..5 {
            block_on(machine.handle_event(&mut ctx, press(Button::Start))).unwrap();
        }
        assert_eq!(machine.name(), RobotStateName::Stand);
        assert_eq!(ctx.servos.board().activations, 1);
    }

    #[test]
    fn stand_maps_sticks_and_dpad_to_the_body_target() {
        let config = RobotConfig::DEFAULT;
        let bus = MessageBus::<NoopRawMutex>::new();
        let mut ctx = MotionContext::new(&config, MockBoard::default(), &bus);
        let mut machine = StateMachine::new();
        tap(&mut machine, &mut ctx, Button::Start);

        let mut axes = [0.0; 6];
        axes[Axis::RightY as usize] = 1.0;
        axes[Axis::RightX as usize] = -0.5;
        let event = ControllerEvent::new(axes, [false; 10], [0, 1]);
        block_on(machine.handle_event(&mut ctx, event)).unwrap();

        let RobotState::Stand(stand) = machine.state() else {
            panic!("expected STAND");
        };
        let control = config.control;
        assert_abs_diff_eq!(stand.target().position.y, control.max_height);
        assert_abs_diff_eq!(stand.target().angles.phi, -0.5 * control.max_yaw);
        assert_abs_diff_eq!(stand.target().angles.psi, control.pitch_step);
        assert_eq!(ctx.filters.mode(), DriveMode::Body);
    }

    #[test]
    fn bumpers_cycle_poses_into_the_joint_filter() {
        let config = RobotConfig::DEFAULT;
        let bus = MessageBus::<NoopRawMutex>::new();
        let mut ctx = MotionContext::new(&config, MockBoard::default(), &bus);
        let mut machine = StateMachine::new();
        tap(&mut machine, &mut ctx, Button::Start);

        tap(&mut machine, &mut ctx, Button::R1);
        assert_eq!(ctx.filters.mode(), DriveMode::Pose);
        assert_eq!(ctx.poses.current().map(|p| p.name), Some("rest"));
        tap(&mut machine, &mut ctx, Button::R1);
        assert_eq!(ctx.poses.current().map(|p| p.name), Some("stand"));
        tap(&mut machine, &mut ctx, Button::L1);
        assert_eq!(ctx.poses.current().map(|p| p.name), Some("rest"));

        for _ in 0..200 {
            machine.update(&mut ctx);
        }
        assert_eq!(ctx.servos.staged(), &config.poses[0].angles);
    }

    #[test]
    fn a_in_walk_returns_to_stand_holding_rest() {
        let config = RobotConfig::DEFAULT;
        let bus = MessageBus::<NoopRawMutex>::new();
        let mut ctx = MotionContext::new(&config, MockBoard::default(), &bus);
        let mut machine = StateMachine::new();
        tap(&mut machine, &mut ctx, Button::Start);
        tap(&mut machine, &mut ctx, Button::Back);
        block_on(machine.handle_event(&mut ctx, stick(Axis::LeftY, 1.0))).unwrap();
        assert!(ctx.keyframes.forward_factor() > 0.0);

        let before = ctx.servos.board().writes.len();
        tap(&mut machine, &mut ctx, Button::A);
        assert_eq!(ctx.servos.board().writes.len(), before + 12);
        let RobotState::Stand(stand) = machine.state() else {
            panic!("expected STAND");
        };
        assert!(stand.is_holding_rest());
        assert_eq!(ctx.keyframes.forward_factor(), 0.0);
        let staged = *ctx.servos.staged();
        machine.update(&mut ctx);
        assert_eq!(ctx.servos.staged(), &staged);
        assert!(!ctx.servos.is_dirty());
    }

    #[test]
    fn walking_forward_moves_the_feet() {
        let config = RobotConfig::DEFAULT;
        let bus = MessageBus::<NoopRawMutex>::new();
        let mut ctx = MotionContext::new(&config, MockBoard::default(), &bus);
        let mut machine = StateMachine::new();
        tap(&mut machine, &mut ctx, Button::Start);
        tap(&mut machine, &mut ctx, Button::Back);
        block_on(machine.handle_event(&mut ctx, stick(Axis::LeftY, 1.0))).unwrap();

        let start = *ctx.gait.feet();
        for _ in 0..10 {
            machine.update(&mut ctx);
        }
        assert!(ctx.gait.feet()[0].x < start[0].x);
        assert!(ctx.servos.is_dirty());
    }

    #[test]
    fn walk_speed_and_resets() {
        let config = RobotConfig::DEFAULT;
        let bus = MessageBus::<NoopRawMutex>::new();
        let mut ctx = MotionContext::new(&config, MockBoard::default(), &bus);
        let mut machine = StateMachine::new();
        tap(&mut machine, &mut ctx, Button::Start);
        tap(&mut machine, &mut ctx, Button::Back);

        let down = ControllerEvent::new([0.0; 6], [false; 10], [0, -1]);
        block_on(machine.handle_event(&mut ctx, down)).unwrap();
        assert_eq!(ctx.keyframes.walking_speed(), config.control.max_walking_speed - 1);

        block_on(machine.handle_event(&mut ctx, stick(Axis::RightY, 0.5))).unwrap();
        assert_abs_diff_eq!(ctx.keyframes.lean_factor(), 0.5);
        tap(&mut machine, &mut ctx, Button::R3);
        assert_eq!(ctx.keyframes.lean_factor(), 0.0);
    }

    #[test]
    fn transit_states_never_remain_current() {
        let config = RobotConfig::DEFAULT;
        let bus = MessageBus::<NoopRawMutex>::new();
        let mut ctx = MotionContext::new(&config, MockBoard::default(), &bus);
        let mut machine = StateMachine::new();
        for button in BUTTONS.iter().cycle().take(40) {
            tap(&mut machine, &mut ctx, *button);
            assert!(!matches!(
                machine.name(),
                RobotStateName::TransitIdle | RobotStateName::TransitStand
            ));
        }
    }
}
